use thiserror::Error;

/// Failure taxonomy for the messaging subsystem.
///
/// None of these are fatal to the process: read paths degrade to empty
/// results at the call boundary, write paths surface the variant to the host
/// application as a user-visible notice.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("No authenticated actor for this session")]
    NotAuthenticated,
    #[error("Not permitted: {0}")]
    NotPermitted(String),
    #[error("Not found")]
    NotFound,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Attachment of {size} bytes exceeds the {limit} byte limit")]
    UploadTooLarge { size: usize, limit: usize },
    #[error("Upload failed: {0}")]
    UploadFailed(String),
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("Event channel dropped")]
    EventChannelDropped,
}

pub type Result<T> = std::result::Result<T, AppError>;
