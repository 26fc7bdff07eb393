//! Shared data types for tandem-pool.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tandem_core::{ConnId, OwnerId};
use tandem_net::{NetworkError, ShadowLink};

/// Lifecycle of one shadow connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Ready,
    Disconnecting,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Ready => write!(f, "ready"),
            ConnectionState::Disconnecting => write!(f, "disconnecting"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Metadata snapshot of a shadow connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowInfo {
    pub owner: OwnerId,
    pub conn_id: ConnId,
    pub nick: String,
    pub display_name: String,
    pub state: ConnectionState,
    pub last_activity_at: DateTime<Utc>,
}

/// Result of [`crate::ShadowPool::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquired {
    /// A connecting or ready connection already existed.
    Existing(ShadowInfo),
    /// A fresh connection object was created and its handshake started.
    Spawned(ShadowInfo),
}

impl Acquired {
    pub fn info(&self) -> &ShadowInfo {
        match self {
            Acquired::Existing(info) | Acquired::Spawned(info) => info,
        }
    }

    pub fn is_spawned(&self) -> bool {
        matches!(self, Acquired::Spawned(_))
    }
}

/// Completions reported back to the task that owns the pool.
///
/// Every signal carries the [`ConnId`] it was produced for, so the owner can
/// recognise and ignore signals from a connection that has since been replaced.
pub enum PoolSignal {
    Connected {
        owner: OwnerId,
        conn_id: ConnId,
        link: Arc<dyn ShadowLink>,
    },
    ConnectFailed {
        owner: OwnerId,
        conn_id: ConnId,
        error: NetworkError,
    },
    InactivityExpired {
        owner: OwnerId,
        conn_id: ConnId,
    },
}

impl fmt::Debug for PoolSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolSignal::Connected {
                owner,
                conn_id,
                link,
            } => f
                .debug_struct("Connected")
                .field("owner", owner)
                .field("conn_id", conn_id)
                .field("nick", &link.nick())
                .finish(),
            PoolSignal::ConnectFailed {
                owner,
                conn_id,
                error,
            } => f
                .debug_struct("ConnectFailed")
                .field("owner", owner)
                .field("conn_id", conn_id)
                .field("error", error)
                .finish(),
            PoolSignal::InactivityExpired { owner, conn_id } => f
                .debug_struct("InactivityExpired")
                .field("owner", owner)
                .field("conn_id", conn_id)
                .finish(),
        }
    }
}
