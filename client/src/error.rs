use protocol::CommandError;
use thiserror::Error;

/// Errors returned by the [`Client`](crate::Client) facade.
#[derive(Debug, Error)]
pub enum RconError {
    /// Socket creation, connect or write failed.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not resolve server address {0:?}")]
    AddressResolution(String),

    #[error("login timed out")]
    LoginTimedOut,

    #[error("timed out writing command to the socket")]
    SendTimedOut,

    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Command(#[from] CommandError),
}

impl RconError {
    /// Timeouts are recoverable; the caller may retry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            RconError::LoginTimedOut
                | RconError::SendTimedOut
                | RconError::Command(CommandError::Timeout { .. })
        )
    }
}
