use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Element is detached from the document: {0}")]
    ElementDetached(String),

    #[error("Interaction failed: {0}")]
    InteractionFailed(String),

    #[error("Host surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("Nothing is selected")]
    NothingSelected,

    #[error("A deletion batch is already in flight")]
    BatchInFlight,

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
