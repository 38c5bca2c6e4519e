use thiserror::Error;

/// Terminal failure loading remote data (the catalog or the selection
/// seed). Rendered in place of the affected list; there is no retry UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FetchError {
    pub message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The most recent failed reconciliation write. Dismissible via
/// `acknowledge_sync_error`; the controller stays usable while one is set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SyncError {
    pub message: String,
}

impl SyncError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
