//! Document conversion routes.
//!
//! Both take a multipart upload in the `file` field. The upload is always
//! removed once the conversion has run.

use axum::{
    Router,
    extract::{Multipart, State, multipart::MultipartRejection},
    response::Response,
    routing::post,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::convert::DocumentKind;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/convert-doc-to-pdf", post(convert_doc_to_pdf))
        .route("/convert-pdf-to-word", post(convert_pdf_to_word))
}

async fn convert_doc_to_pdf(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    convert(state, DocumentKind::OfficeToPdf, multipart).await
}

async fn convert_pdf_to_word(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    convert(state, DocumentKind::PdfToDocx, multipart).await
}

async fn convert(
    state: AppState,
    kind: DocumentKind,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Response> {
    let multipart = multipart.map_err(|e| ApiError::bad_request("INVALID_UPLOAD", e.body_text()))?;
    Ok(state.orchestrator.convert_document(kind, multipart).await?)
}
