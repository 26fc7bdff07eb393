use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Network-A user id that owns a shadow connection (e.g. `U024BE7LH`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-connection identifier (random UUID, never reused).
///
/// A fresh id is minted for every shadow connection object, so work that was
/// started for one connection can tell when it has been replaced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub String);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Presence as reported by network A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Active,
    Away,
    #[default]
    Unknown,
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenceState::Active => write!(f, "active"),
            PresenceState::Away => write!(f, "away"),
            PresenceState::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for PresenceState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(PresenceState::Active),
            "away" => Ok(PresenceState::Away),
            "unknown" => Ok(PresenceState::Unknown),
            other => Err(format!("unknown presence: {}", other)),
        }
    }
}

/// Snapshot of a network-A user, refreshed on each relevant event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: OwnerId,
    pub display_name: String,
    #[serde(default)]
    pub presence: PresenceState,
}

impl Identity {
    pub fn new(id: impl Into<OwnerId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            presence: PresenceState::Unknown,
        }
    }

    pub fn with_presence(mut self, presence: PresenceState) -> Self {
        self.presence = presence;
        self
    }
}

/// How a relayed line should be rendered on the receiving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Normal,
    /// `/me`-style emote.
    Action,
    Notice,
}

/// A file shared alongside a network-A message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

/// A single relayable message, consumed once by the queue or the send path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub source_author: OwnerId,
    pub source_channel: String,
    pub raw_text: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl MessageEnvelope {
    pub fn new(
        source_author: impl Into<OwnerId>,
        source_channel: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            source_author: source_author.into(),
            source_channel: source_channel.into(),
            raw_text: raw_text.into(),
            kind: MessageKind::Normal,
            attachments: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Text as it should appear on network B: body followed by attachment URLs.
    pub fn rendered_text(&self) -> String {
        let mut out = self.raw_text.clone();
        for att in &self.attachments {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&att.url);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conn_ids_are_unique() {
        assert_ne!(ConnId::new(), ConnId::new());
    }

    #[test]
    fn presence_round_trips_through_str() {
        for p in [PresenceState::Active, PresenceState::Away, PresenceState::Unknown] {
            assert_eq!(p.to_string().parse::<PresenceState>().unwrap(), p);
        }
        assert!("busy".parse::<PresenceState>().is_err());
    }

    #[test]
    fn rendered_text_appends_attachment_urls() {
        let mut env = MessageEnvelope::new("U1", "#general", "look at this");
        env.attachments.push(Attachment {
            name: "cat.png".to_string(),
            url: "https://files.example/cat.png".to_string(),
        });
        assert_eq!(
            env.rendered_text(),
            "look at this https://files.example/cat.png"
        );
    }

    #[test]
    fn rendered_text_of_attachment_only_message() {
        let mut env = MessageEnvelope::new("U1", "#general", "");
        env.attachments.push(Attachment {
            name: "a.txt".to_string(),
            url: "https://f/a.txt".to_string(),
        });
        assert_eq!(env.rendered_text(), "https://f/a.txt");
    }
}
