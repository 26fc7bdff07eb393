use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use tandem_core::{Attachment, ConnId, MessageKind, OwnerId, PresenceState};

/// Inbound traffic from network A, as delivered by the home client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HomeEvent {
    Message {
        user_id: String,
        channel_id: String,
        text: String,
        #[serde(default)]
        kind: MessageKind,
        #[serde(default)]
        attachments: Vec<Attachment>,
        /// Posted by a bot (including this bridge); never relayed.
        #[serde(default)]
        from_bot: bool,
    },
    Presence {
        user_id: String,
        presence: PresenceState,
    },
    Typing {
        user_id: String,
        channel_id: String,
    },
}

/// Inbound traffic from one network-B connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShadowEvent {
    /// PRIVMSG / NOTICE / CTCP ACTION. `target` is a channel or our own nick.
    Message {
        target: String,
        nick: String,
        text: String,
        #[serde(default)]
        kind: MessageKind,
    },
    Join {
        channel: String,
        nick: String,
    },
    Part {
        channel: String,
        nick: String,
        reason: Option<String>,
    },
    Quit {
        nick: String,
        reason: Option<String>,
    },
    Kick {
        channel: String,
        nick: String,
        by: String,
        reason: Option<String>,
    },
    NickChange {
        old: String,
        new: String,
    },
    Invite {
        channel: String,
        by: String,
    },
    Names {
        channel: String,
        nicks: Vec<String>,
    },
    /// The connection dropped without us asking for it.
    Disconnected {
        reason: String,
    },
}

/// Which shadow connection an event came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShadowOrigin {
    pub owner: OwnerId,
    pub conn_id: ConnId,
}

/// A [`ShadowEvent`] tagged with the connection it arrived on.
///
/// `origin` is `None` for the bridge's own listener connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkBEvent {
    pub origin: Option<ShadowOrigin>,
    pub event: ShadowEvent,
}

/// Handed to [`crate::ShadowConnector::connect`]; tags every event with its origin.
#[derive(Debug, Clone)]
pub struct ShadowEventSink {
    origin: Option<ShadowOrigin>,
    tx: mpsc::UnboundedSender<NetworkBEvent>,
}

impl ShadowEventSink {
    pub fn new(origin: Option<ShadowOrigin>, tx: mpsc::UnboundedSender<NetworkBEvent>) -> Self {
        Self { origin, tx }
    }

    pub fn origin(&self) -> Option<&ShadowOrigin> {
        self.origin.as_ref()
    }

    /// Forward an event to the relay. Events after the relay has stopped are dropped.
    pub fn emit(&self, event: ShadowEvent) {
        let tagged = NetworkBEvent {
            origin: self.origin.clone(),
            event,
        };
        if self.tx.send(tagged).is_err() {
            debug!(origin = ?self.origin, "relay stopped, dropping network-B event");
        }
    }
}
