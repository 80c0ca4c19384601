//! Per-request pipeline state machine.

use crate::Error;

/// Pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    /// Checking the request. Nothing is held yet.
    #[default]
    Validating,
    /// Acquiring the input (origin stream or upload).
    Fetching,
    /// An external tool is producing the output.
    Transcoding,
    /// The response body is being written.
    Delivering,
    /// Removing the request's artifacts after delivery.
    Cleaning,
    /// Finished successfully.
    Done,
    /// Finished with an error or client abort.
    Errored,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validating => "VALIDATING",
            Self::Fetching => "FETCHING",
            Self::Transcoding => "TRANSCODING",
            Self::Delivering => "DELIVERING",
            Self::Cleaning => "CLEANING",
            Self::Done => "DONE",
            Self::Errored => "ERRORED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Errored)
    }

    /// Validate a state transition.
    pub fn can_transition_to(&self, target: PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            // Terminal states never move
            (Done | Errored, _) => false,

            // Any live state can fail
            (_, Errored) => true,

            (Validating, Fetching) => true,
            (Fetching, Transcoding | Delivering) => true,
            (Transcoding, Delivering) => true,
            (Delivering, Cleaning) => true,
            (Cleaning, Done) => true,

            _ => false,
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&self, target: PipelineState) -> Result<PipelineState, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
