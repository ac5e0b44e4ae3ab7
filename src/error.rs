use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeetError {
    #[error("Meet not found")]
    NotFound,

    #[error("Meet has not been started")]
    SessionNotStarted,

    #[error("Meet has expired")]
    SessionExpired,

    #[error("Conversation already opened")]
    AlreadyOpened,

    #[error("Not your turn to speak")]
    OutOfOrderTurn,

    #[error("Turn quota reached, try again later")]
    QuotaExceeded,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Reply generation failed: {0}")]
    Generation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MeetError {
    /// Client errors are expected outcomes of the meet state machine and
    /// safe to echo back verbatim. Everything else is an internal
    /// dependency failure: logged in full, surfaced as a generic message.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::SessionNotStarted
                | Self::SessionExpired
                | Self::AlreadyOpened
                | Self::OutOfOrderTurn
                | Self::QuotaExceeded
                | Self::Unauthorized
                | Self::Validation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MeetError>;
