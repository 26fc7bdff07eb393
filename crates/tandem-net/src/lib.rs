//! Seams to the two chat networks.
//!
//! Concrete transports live outside this workspace; the relay only talks to
//! the [`HomeNetwork`] and [`ShadowConnector`] / [`ShadowLink`] traits.

pub mod backoff;
pub mod error;
pub mod events;
pub mod home;
pub mod shadow;

pub use backoff::{connect_with_backoff, BackoffPolicy};
pub use error::{NetworkError, Result};
pub use events::{HomeEvent, NetworkBEvent, ShadowEvent, ShadowEventSink, ShadowOrigin};
pub use home::{ChannelInfo, HomeNetwork, SendOptions};
pub use shadow::{ConnectRequest, PresenceInfo, ShadowConnector, ShadowLink};
