use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tandem_core::Identity;

use crate::error::Result;

/// Network-A channel metadata returned by [`HomeNetwork::lookup_channel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    /// Channel name without decoration (e.g. `general`).
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

/// Presentation hints for a message posted on network A.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Post under this name instead of the bot's own (relayed network-B nick).
    pub username: Option<String>,
    /// Render as a low-key status line (join/part notices).
    #[serde(default)]
    pub status: bool,
}

impl SendOptions {
    pub fn as_user(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            status: false,
        }
    }

    pub fn status() -> Self {
        Self {
            username: None,
            status: true,
        }
    }
}

/// Client for the home network, shared by the whole bridge.
///
/// Implementations must be `Send + Sync` so the relay engine can hold them
/// behind an `Arc` and call them from spawned tasks.
#[async_trait]
pub trait HomeNetwork: Send + Sync {
    /// Post `text` to a channel or user id.
    async fn send_message(&self, target: &str, text: &str, options: &SendOptions) -> Result<()>;

    /// Fetch a fresh identity snapshot for a user id.
    async fn lookup_user(&self, user_id: &str) -> Result<Identity>;

    /// Fetch channel metadata for a channel id.
    async fn lookup_channel(&self, channel_id: &str) -> Result<ChannelInfo>;

    /// Open (or reuse) a direct-message channel with a user and return its id.
    async fn open_direct_message(&self, user_id: &str) -> Result<String>;
}
