use std::collections::{BTreeMap, HashSet};

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};

pub const DEFAULT_PORT: u16 = 6667;
pub const DEFAULT_NICK_SUFFIX: &str = "-sl";
pub const DEFAULT_MAX_NICK_LEN: usize = 16;
pub const DEFAULT_INACTIVITY_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_SEND_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 2;
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 60;
pub const DEFAULT_LINE_BUDGET: usize = 400; // bytes of text per network-B line
pub const DEFAULT_NAMES_POLL_SECS: u64 = 300;
pub const DEFAULT_COMMAND_PREFIX: &str = ".";

/// Top-level config (tandem.toml + TANDEM_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TandemConfig {
    pub network_a: NetworkAConfig,
    pub network_b: NetworkBConfig,
    /// Network-A channel name -> network-B channel name.
    #[serde(default)]
    pub channels: BTreeMap<String, String>,
}

/// Home network (where identities live).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkAConfig {
    pub bot_token: String,
    /// Relay join/part/quit/kick on network B as status lines.
    #[serde(default = "bool_true")]
    pub status_notices: bool,
    /// Spawn a shadow connection when a user becomes active or starts typing,
    /// not only when they first send a message.
    #[serde(default = "bool_true")]
    pub presence_connect: bool,
    /// Single characters that mark a message as a bridge command.
    #[serde(default = "default_command_prefixes")]
    pub command_prefixes: Vec<String>,
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
}

/// Shadow network (where per-user virtual connections live).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkBConfig {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    /// Nick of the bridge's own listener connection.
    pub bot_nick: String,
    #[serde(default = "default_nick_suffix")]
    pub nick_suffix: String,
    #[serde(default = "default_max_nick_len")]
    pub max_nick_len: usize,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Tries per queued message before it is dropped and its owner told.
    #[serde(default = "default_send_attempts")]
    pub send_attempts: u32,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    #[serde(default = "default_line_budget")]
    pub line_budget: usize,
    #[serde(default = "default_names_poll_secs")]
    pub names_poll_secs: u64,
}

impl Default for NetworkAConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            status_notices: true,
            presence_connect: true,
            command_prefixes: default_command_prefixes(),
            inactivity_timeout_secs: DEFAULT_INACTIVITY_TIMEOUT_SECS,
        }
    }
}

impl Default for NetworkBConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: DEFAULT_PORT,
            tls: false,
            bot_nick: String::new(),
            nick_suffix: default_nick_suffix(),
            max_nick_len: DEFAULT_MAX_NICK_LEN,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            send_attempts: DEFAULT_SEND_ATTEMPTS,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            line_budget: DEFAULT_LINE_BUDGET,
            names_poll_secs: DEFAULT_NAMES_POLL_SECS,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_nick_suffix() -> String {
    DEFAULT_NICK_SUFFIX.to_string()
}
fn default_max_nick_len() -> usize {
    DEFAULT_MAX_NICK_LEN
}
fn default_connect_attempts() -> u32 {
    DEFAULT_CONNECT_ATTEMPTS
}
fn default_send_attempts() -> u32 {
    DEFAULT_SEND_ATTEMPTS
}
fn default_backoff_base_secs() -> u64 {
    DEFAULT_BACKOFF_BASE_SECS
}
fn default_backoff_max_secs() -> u64 {
    DEFAULT_BACKOFF_MAX_SECS
}
fn default_line_budget() -> usize {
    DEFAULT_LINE_BUDGET
}
fn default_names_poll_secs() -> u64 {
    DEFAULT_NAMES_POLL_SECS
}
fn default_inactivity_timeout_secs() -> u64 {
    DEFAULT_INACTIVITY_TIMEOUT_SECS
}
fn default_command_prefixes() -> Vec<String> {
    vec![DEFAULT_COMMAND_PREFIX.to_string()]
}

impl TandemConfig {
    /// Load config from a TOML file with TANDEM_* env var overrides, then validate.
    ///
    /// Nested keys use a double underscore, e.g. `TANDEM_NETWORK_B__SERVER`.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(path = %path, "loading configuration");

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("TANDEM_").split("__")),
        )
    }

    /// Parse and validate an in-memory TOML document (no env overrides).
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Self::from_figment(Figment::from(Toml::string(toml)))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: TandemConfig = figment
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the bridge cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.network_b.server.trim().is_empty() {
            return Err(CoreError::Config("network_b.server is required".into()));
        }
        if self.network_b.bot_nick.trim().is_empty() {
            return Err(CoreError::Config("network_b.bot_nick is required".into()));
        }
        if self.network_b.nick_suffix.is_empty() {
            return Err(CoreError::Config("network_b.nick_suffix must not be empty".into()));
        }
        if self.network_b.max_nick_len <= self.network_b.nick_suffix.chars().count() {
            return Err(CoreError::Config(format!(
                "network_b.max_nick_len ({}) leaves no room for the suffix {:?}",
                self.network_b.max_nick_len, self.network_b.nick_suffix
            )));
        }
        if self.network_b.connect_attempts == 0 {
            return Err(CoreError::Config("network_b.connect_attempts must be at least 1".into()));
        }
        if self.network_b.send_attempts == 0 {
            return Err(CoreError::Config("network_b.send_attempts must be at least 1".into()));
        }
        if self.network_b.line_budget < 16 {
            return Err(CoreError::Config("network_b.line_budget is too small".into()));
        }
        if self.network_a.inactivity_timeout_secs == 0 {
            return Err(CoreError::Config(
                "network_a.inactivity_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.network_a.command_prefixes.is_empty() {
            return Err(CoreError::Config("network_a.command_prefixes must not be empty".into()));
        }
        for prefix in &self.network_a.command_prefixes {
            if prefix.chars().count() != 1 {
                return Err(CoreError::Config(format!(
                    "command prefix {:?} must be a single character",
                    prefix
                )));
            }
        }
        self.validate_channels()
    }

    fn validate_channels(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(CoreError::Config("at least one channel mapping is required".into()));
        }

        let mut seen_b = HashSet::new();
        for (a, b) in &self.channels {
            if a.trim().is_empty() {
                return Err(CoreError::ChannelMapping {
                    channel: a.clone(),
                    reason: "network-A channel name is empty".into(),
                });
            }
            if !(b.starts_with('#') || b.starts_with('&')) || b.len() < 2 {
                return Err(CoreError::ChannelMapping {
                    channel: a.clone(),
                    reason: format!("network-B channel {:?} must start with '#' or '&'", b),
                });
            }
            if b.contains(' ') || b.contains(',') {
                return Err(CoreError::ChannelMapping {
                    channel: a.clone(),
                    reason: format!("network-B channel {:?} contains a space or comma", b),
                });
            }
            if !seen_b.insert(b.to_lowercase()) {
                return Err(CoreError::ChannelMapping {
                    channel: a.clone(),
                    reason: format!("network-B channel {:?} is mapped twice", b),
                });
            }
        }
        Ok(())
    }

    /// The configured command prefixes as characters.
    pub fn command_prefix_chars(&self) -> Vec<char> {
        self.network_a
            .command_prefixes
            .iter()
            .filter_map(|p| p.chars().next())
            .collect()
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tandem/tandem.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r##"
        [network_a]
        bot_token = "xoxb-test"

        [network_b]
        server = "irc.example.net"
        bot_nick = "tandem"

        [channels]
        "#general" = "#irc-general"
    "##;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = TandemConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.network_b.port, DEFAULT_PORT);
        assert_eq!(config.network_b.nick_suffix, "-sl");
        assert_eq!(config.network_a.inactivity_timeout_secs, 120);
        assert_eq!(config.network_b.send_attempts, DEFAULT_SEND_ATTEMPTS);
        assert_eq!(config.command_prefix_chars(), vec!['.']);
        assert!(config.network_a.status_notices);
        assert_eq!(config.channels.get("#general").unwrap(), "#irc-general");
    }

    #[test]
    fn missing_server_is_rejected() {
        let toml = MINIMAL.replace("server = \"irc.example.net\"", "server = \"\"");
        let err = TandemConfig::from_toml_str(&toml).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn missing_required_field_is_a_config_error() {
        let toml = MINIMAL.replace("bot_nick = \"tandem\"", "");
        assert!(matches!(
            TandemConfig::from_toml_str(&toml),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn malformed_network_b_channel_is_rejected() {
        let toml = MINIMAL.replace("\"#irc-general\"", "\"irc-general\"");
        let err = TandemConfig::from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, CoreError::ChannelMapping { .. }));
    }

    #[test]
    fn duplicate_network_b_channel_is_rejected() {
        let toml = format!("{MINIMAL}\n\"#random\" = \"#IRC-General\"\n");
        let err = TandemConfig::from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, CoreError::ChannelMapping { .. }));
    }

    #[test]
    fn multi_char_prefix_is_rejected() {
        let toml = MINIMAL.replace(
            "bot_token = \"xoxb-test\"",
            "bot_token = \"xoxb-test\"\ncommand_prefixes = [\"!!\"]",
        );
        assert!(TandemConfig::from_toml_str(&toml).is_err());
    }

    #[test]
    fn zero_inactivity_timeout_is_rejected() {
        let toml = MINIMAL.replace(
            "bot_token = \"xoxb-test\"",
            "bot_token = \"xoxb-test\"\ninactivity_timeout_secs = 0",
        );
        assert!(TandemConfig::from_toml_str(&toml).is_err());
    }

    #[test]
    fn zero_send_attempts_is_rejected() {
        let toml = MINIMAL.replace(
            "bot_nick = \"tandem\"",
            "bot_nick = \"tandem\"\nsend_attempts = 0",
        );
        assert!(TandemConfig::from_toml_str(&toml).is_err());
    }
}
