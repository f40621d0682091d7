use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DAP error: {0}")]
    Dap(String),

    #[error("Failed to dump cell {cell}: {reason}")]
    DumpFailed { cell: String, reason: String },

    #[error("Debug file {path} already belongs to {existing}, refusing to map it to {incoming}")]
    DuplicatePath {
        path: String,
        existing: String,
        incoming: String,
    },

    #[error("Debug session has ended")]
    SessionEnded,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Numeric id reported in the `body.error.id` of failed DAP responses.
    pub fn error_code(&self) -> i32 {
        match self {
            Error::SessionNotFound(_) => 1001,
            Error::SessionEnded => 1002,
            Error::DumpFailed { .. } => 1003,
            Error::DuplicatePath { .. } => 1004,
            Error::Dap(_) => 1005,
            Error::InvalidRequest(_) => 1006,
            Error::Config(_) => 1007,
            Error::Internal(_) | Error::Io(_) | Error::Json(_) => 1099,
        }
    }
}
