use thiserror::Error;

/// Failure of a single status query. The poller treats every variant as
/// "no news" and keeps polling.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Status request rejected: {0}")]
    Rejected(String),

    #[error("Status service unavailable: {0}")]
    Unavailable(String),
}
