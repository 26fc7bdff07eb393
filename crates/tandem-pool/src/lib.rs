//! tandem-pool: per-owner shadow connections and their outbound queues.
//!
//! Both structures are plain arenas keyed by [`OwnerId`](tandem_core::OwnerId)
//! and are meant to be owned by a single relay task: every mutation takes
//! `&mut self`, which is what makes `acquire` single-flight per owner.
//!
//! - [`ShadowPool`]: lifecycle `connecting → ready → disconnecting → closed`,
//!   bounded connect retry, inactivity teardown.
//! - [`OutboundQueue`]: FIFO per (owner, destination), drained once ready.

pub mod error;
pub mod pool;
pub mod queue;
pub mod types;

pub use error::{PoolError, Result};
pub use pool::{PoolSettings, ShadowPool, AWAY_REASON};
pub use queue::{DrainReport, OutboundQueue, SendOutcome, DEFAULT_MAX_ATTEMPTS};
pub use types::{Acquired, ConnectionState, PoolSignal, ShadowInfo};
