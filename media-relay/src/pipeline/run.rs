use std::time::Instant;

use tracing::{Span, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::PipelineState;
use crate::artifact::ArtifactRecord;
use crate::delivery::{DeliveryOutcome, OnFinish};
use crate::{Error, Result};

/// What a request produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Video,
    AudioMp3,
    Pdf,
    Docx,
}

impl OutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::AudioMp3 => "audio_mp3",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    /// Name suggested to the client.
    pub fn filename(&self) -> &'static str {
        match self {
            Self::Video => "video.mp4",
            Self::AudioMp3 => "audio.mp3",
            Self::Pdf => "converted.pdf",
            Self::Docx => "converted.docx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Video => "video/mp4",
            Self::AudioMp3 => "audio/mpeg",
            Self::Pdf => "application/pdf",
            Self::Docx => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        }
    }

    /// Content type sent to the client for a body whose producer reported
    /// `produced`. Only a video origin may refine the type, and only with
    /// another `video/*` type.
    pub fn response_content_type<'a>(&self, produced: Option<&'a str>) -> &'a str {
        match (self, produced) {
            (Self::Video, Some(ct)) if is_video_type(ct) => ct,
            _ => self.content_type(),
        }
    }
}

fn is_video_type(content_type: &str) -> bool {
    content_type
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("video/"))
}

/// Handle to an artifact owned by a [`PipelineRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactId(usize);

/// One request moving through the pipeline.
///
/// The run owns every artifact allocated for the request and is consumed by
/// exactly one of [`fail`](Self::fail) or the delivery completion signal, both
/// of which clean up. If it is dropped without either, the artifacts' own
/// `Drop` removes their files.
pub struct PipelineRun {
    id: Uuid,
    kind: OutputKind,
    state: PipelineState,
    artifacts: Vec<ArtifactRecord>,
    span: Span,
    started: Instant,
}

impl PipelineRun {
    pub fn new(kind: OutputKind) -> Self {
        let id = Uuid::new_v4();
        let span = info_span!("pipeline", request_id = %id, kind = kind.as_str());
        span.in_scope(|| debug!("Pipeline started"));
        Self {
            id,
            kind,
            state: PipelineState::Validating,
            artifacts: Vec::new(),
            span,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Correlation id used in artifact names and logs.
    pub fn correlation(&self) -> String {
        self.id.to_string()
    }

    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Move to `target`, refusing transitions the state machine forbids.
    pub fn transition(&mut self, target: PipelineState) -> Result<()> {
        let _enter = self.span.enter();
        match self.state.transition_to(target) {
            Ok(next) => {
                debug!(from = %self.state, to = %next, "Pipeline state changed");
                self.state = next;
                Ok(())
            }
            Err(e) => {
                warn!(from = %self.state, to = %target, "Refused pipeline state transition");
                Err(e)
            }
        }
    }

    /// Take ownership of an artifact for the rest of the request.
    pub fn adopt(&mut self, record: ArtifactRecord) -> ArtifactId {
        self.artifacts.push(record);
        ArtifactId(self.artifacts.len() - 1)
    }

    pub fn artifact(&self, id: ArtifactId) -> &ArtifactRecord {
        &self.artifacts[id.0]
    }

    pub fn artifact_mut(&mut self, id: ArtifactId) -> &mut ArtifactRecord {
        &mut self.artifacts[id.0]
    }

    /// Delete one artifact now, ahead of the final cleanup.
    pub async fn release(&mut self, id: ArtifactId) {
        let record = &mut self.artifacts[id.0];
        if let Err(e) = record.delete().await {
            let _enter = self.span.enter();
            warn!(error = %e, "Failed to release artifact");
        }
    }

    async fn cleanup(&mut self) {
        for record in &mut self.artifacts {
            if let Err(e) = record.delete().await {
                let _enter = self.span.enter();
                warn!(error = %e, "Artifact cleanup failed");
            }
        }
    }

    /// Delete the remaining artifacts off the async workers.
    ///
    /// Runs inline when no runtime is available.
    fn cleanup_in_background(&mut self) {
        let mut records = std::mem::take(&mut self.artifacts);
        let span = self.span.clone();
        let mut delete_all = move || {
            for record in &mut records {
                if let Err(e) = record.delete_now() {
                    let _enter = span.enter();
                    warn!(error = %e, "Artifact cleanup failed");
                }
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(delete_all);
            }
            Err(_) => delete_all(),
        }
    }

    /// Clean up, mark the run errored and hand the error back.
    pub async fn fail(mut self, err: Error) -> Error {
        self.cleanup().await;

        let _enter = self.span.enter();
        let from = self.state;
        self.state = PipelineState::Errored;
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        if err.is_client_error() {
            warn!(from = %from, elapsed_ms, error = %err, "Request rejected");
        } else {
            error!(from = %from, elapsed_ms, error = %err, "Pipeline failed");
        }
        drop(_enter);
        err
    }

    /// Settle the run once the response body has finished.
    ///
    /// Called from inside the body's poll or drop, so file removal is handed
    /// to the blocking pool.
    pub fn complete(mut self, outcome: DeliveryOutcome) {
        if let Err(e) = self.transition(PipelineState::Cleaning) {
            let _enter = self.span.enter();
            warn!(error = %e, "Completing pipeline from unexpected state");
        }
        self.cleanup_in_background();

        let _enter = self.span.enter();
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let bytes = outcome.bytes();
        match outcome {
            DeliveryOutcome::Completed { .. } => {
                self.state = PipelineState::Done;
                info!(bytes, elapsed_ms, "Delivered");
            }
            DeliveryOutcome::Aborted { .. } => {
                self.state = PipelineState::Errored;
                info!(
                    bytes,
                    elapsed_ms,
                    error = %Error::DeliveryAborted { bytes },
                    "Client went away"
                );
            }
            DeliveryOutcome::Failed { error, .. } => {
                self.state = PipelineState::Errored;
                error!(bytes, elapsed_ms, error = %error, "Delivery failed");
            }
        }
        drop(_enter);
    }

    /// Turn the run into the completion callback for its response body.
    pub fn into_on_finish(self) -> OnFinish {
        Box::new(move |outcome| self.complete(outcome))
    }
}

impl std::fmt::Debug for PipelineRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRun")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("artifacts", &self.artifacts.len())
            .finish()
    }
}

impl Drop for PipelineRun {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            let _enter = self.span.enter();
            info!(state = %self.state, "Request dropped before completion");
            self.state = PipelineState::Errored;
        }
    }
}
