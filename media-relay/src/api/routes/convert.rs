//! `GET /convert?url=<locator>[&stream=true]`: deliver the origin's audio as mp3.

use axum::{
    Router,
    extract::{Query, State},
    response::Response,
    routing::get,
};
use serde::Deserialize;

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::pipeline::AudioMode;

pub fn router() -> Router<AppState> {
    Router::new().route("/convert", get(convert))
}

#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    #[serde(default)]
    pub url: String,
    /// Pipe the encoder output straight through instead of staging a file.
    pub stream: Option<String>,
}

impl ConvertQuery {
    pub fn mode(&self) -> AudioMode {
        match self.stream.as_deref().map(str::trim) {
            Some(v) if v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") => {
                AudioMode::Stream
            }
            _ => AudioMode::Artifact,
        }
    }
}

async fn convert(
    State(state): State<AppState>,
    Query(query): Query<ConvertQuery>,
) -> ApiResult<Response> {
    Ok(state
        .orchestrator
        .convert_audio(&query.url, query.mode())
        .await?)
}
