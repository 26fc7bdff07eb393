pub mod config;
pub mod error;
pub mod types;

pub use config::TandemConfig;
pub use error::{CoreError, Result};
pub use types::{
    Attachment, ConnId, Identity, MessageEnvelope, MessageKind, OwnerId, PresenceState,
};
