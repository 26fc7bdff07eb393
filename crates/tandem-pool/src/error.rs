//! Error types for the tandem-pool crate.

use thiserror::Error;

use tandem_net::NetworkError;

#[derive(Debug, Error)]
pub enum PoolError {
    /// No shadow connection exists for the owner.
    #[error("No shadow connection for {owner}")]
    NotFound { owner: String },

    /// The connection exists but has not finished its handshake.
    #[error("Shadow connection for {owner} is not ready")]
    NotReady { owner: String },

    /// Underlying network-B failure.
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, PoolError>;
