use thiserror::Error;

/// Failures surfaced by the store collaborators.
///
/// `Unavailable` is the only variant the driver treats as fatal for a run;
/// everything else is recovered at the node that triggered it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("creation rejected: {0}")]
    CreationRejected(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}
