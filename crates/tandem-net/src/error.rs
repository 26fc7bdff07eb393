use thiserror::Error;

/// Errors surfaced by either network client.
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    /// Network B refused the nick because someone already holds it.
    #[error("Nickname in use: {0}")]
    NicknameInUse(String),

    /// Network B refused the nick as syntactically invalid.
    #[error("Erroneous nickname: {0}")]
    ErroneousNickname(String),

    /// The remote rejected our credentials.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The underlying transport could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A message could not be delivered to the remote endpoint.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// An operation exceeded its allowed time budget.
    #[error("Operation timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// A user, channel, or nick lookup found nothing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The connection is gone; nothing more can be sent on it.
    #[error("Connection closed")]
    Closed,
}

impl NetworkError {
    /// Fatal errors are never retried: they will fail the same way again.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NetworkError::NicknameInUse(_)
                | NetworkError::ErroneousNickname(_)
                | NetworkError::AuthFailed(_)
        )
    }

    /// Protocol-level rejection of the requested identity.
    pub fn is_nick_rejection(&self) -> bool {
        matches!(
            self,
            NetworkError::NicknameInUse(_) | NetworkError::ErroneousNickname(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nick_rejections_are_fatal() {
        assert!(NetworkError::NicknameInUse("bob-sl".into()).is_fatal());
        assert!(NetworkError::ErroneousNickname("1bob".into()).is_fatal());
        assert!(NetworkError::AuthFailed("bad pass".into()).is_fatal());
    }

    #[test]
    fn transport_errors_are_retryable() {
        assert!(!NetworkError::ConnectionFailed("reset".into()).is_fatal());
        assert!(!NetworkError::Timeout { ms: 5000 }.is_fatal());
        assert!(!NetworkError::Closed.is_fatal());
    }
}
