use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::events::ShadowEventSink;

/// Everything a network-B client needs to register one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub nick: String,
    pub server: String,
    pub port: u16,
    pub tls: bool,
    /// Real-name / gecos field; the owner's display name for shadows.
    pub real_name: String,
    /// Channels to join as part of registration.
    pub channels: Vec<String>,
}

/// Reply to a `whois` query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceInfo {
    pub nick: String,
    pub away: bool,
    #[serde(default)]
    pub channels: Vec<String>,
}

/// Opens connections on network B.
#[async_trait]
pub trait ShadowConnector: Send + Sync {
    /// Connect and register as `request.nick`.
    ///
    /// Resolves once the server has accepted the registration (the "ready"
    /// point) or with the error that stopped it. Events for the connection are
    /// pushed into `events` for as long as it stays up.
    async fn connect(
        &self,
        request: ConnectRequest,
        events: ShadowEventSink,
    ) -> Result<Arc<dyn ShadowLink>>;
}

/// One registered connection on network B.
#[async_trait]
pub trait ShadowLink: Send + Sync {
    /// Nick the server accepted for this connection.
    fn nick(&self) -> &str;

    async fn send(&self, target: &str, text: &str) -> Result<()>;

    async fn send_action(&self, target: &str, text: &str) -> Result<()>;

    async fn send_notice(&self, target: &str, text: &str) -> Result<()>;

    async fn join(&self, channel: &str) -> Result<()>;

    /// Quit with `reason` as the human-readable quit message.
    async fn disconnect(&self, reason: &str) -> Result<()>;

    /// `Ok(None)` when the nick is not on the network.
    async fn whois(&self, nick: &str) -> Result<Option<PresenceInfo>>;

    /// Ask for a names listing; the reply arrives as [`crate::ShadowEvent::Names`].
    async fn request_names(&self, channel: &str) -> Result<()>;

    /// `Ok(None)` when no topic is set.
    async fn topic(&self, channel: &str) -> Result<Option<String>>;
}
