use thiserror::Error;

use tandem_core::CoreError;
use tandem_net::NetworkError;
use tandem_pool::PoolError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] CoreError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Channel not mapped: {0}")]
    UnmappedChannel(String),

    #[error("Bridge stopped")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, RelayError>;
