use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid channel mapping for {channel}: {reason}")]
    ChannelMapping { channel: String, reason: String },
}

impl CoreError {
    /// Short error code string for log fields.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::ChannelMapping { .. } => "CHANNEL_MAPPING_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
