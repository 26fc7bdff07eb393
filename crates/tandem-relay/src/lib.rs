//! tandem-relay: the event loop that bridges network A and network B.
//!
//! [`RelayEngine`] owns the shadow pool, the outbound queue and the membership
//! view of one bridge and processes every inbound event on a single task.
//! [`spawn_bridge`] wires it up and hands back a [`BridgeHandle`].

pub mod bridge;
pub mod channel_map;
pub mod commands;
pub mod engine;
pub mod error;
pub mod members;

pub use bridge::{spawn_bridge, BridgeHandle};
pub use channel_map::ChannelMap;
pub use commands::{help_text, parse_command, Command, ParsedCommand};
pub use engine::{RelayEngine, RelayEvent, SHUTDOWN_REASON};
pub use error::{RelayError, Result};
pub use members::Membership;
