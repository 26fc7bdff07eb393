//! `ShadowPool`: owns every per-owner shadow connection on network B.
//!
//! The pool is an arena keyed by owner id and is owned by exactly one relay
//! task. Work that has to wait (the connect handshake, the inactivity timer)
//! runs in spawned tasks that report back through [`PoolSignal`]s; the relay
//! feeds those into [`ShadowPool::mark_ready`], [`ShadowPool::connect_failed`]
//! and [`ShadowPool::expire`]. Each signal carries the [`ConnId`] it was made
//! for, so a signal from a replaced connection changes nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use tandem_core::{ConnId, Identity, OwnerId};
use tandem_format::NickRule;
use tandem_net::{
    connect_with_backoff, BackoffPolicy, ConnectRequest, NetworkBEvent, NetworkError,
    ShadowConnector, ShadowEventSink, ShadowLink, ShadowOrigin,
};

use crate::error::{PoolError, Result};
use crate::types::{Acquired, ConnectionState, PoolSignal, ShadowInfo};

/// Quit message used when the inactivity timer fires.
pub const AWAY_REASON: &str = "away";

const SUPERSEDED_REASON: &str = "superseded";

/// Static settings shared by every shadow connection of one bridge.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub server: String,
    pub port: u16,
    pub tls: bool,
    /// Network-B channels every shadow joins on registration.
    pub channels: Vec<String>,
    pub nick_rule: NickRule,
    pub inactivity_timeout: Duration,
    pub backoff: BackoffPolicy,
    /// Upper bound on waiting for a network-B quit to complete.
    pub disconnect_timeout: Duration,
}

struct ShadowConnection {
    owner: OwnerId,
    conn_id: ConnId,
    display_name: String,
    nick: String,
    state: ConnectionState,
    last_activity_at: DateTime<Utc>,
    link: Option<Arc<dyn ShadowLink>>,
    connect_task: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl ShadowConnection {
    fn info(&self) -> ShadowInfo {
        ShadowInfo {
            owner: self.owner.clone(),
            conn_id: self.conn_id.clone(),
            nick: self.nick.clone(),
            display_name: self.display_name.clone(),
            state: self.state,
            last_activity_at: self.last_activity_at,
        }
    }

    fn is_live(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Ready
        )
    }

    fn abort_tasks(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for ShadowConnection {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Arena of shadow connections, one per owner.
pub struct ShadowPool {
    connector: Arc<dyn ShadowConnector>,
    settings: PoolSettings,
    connections: HashMap<OwnerId, ShadowConnection>,
    signals: mpsc::UnboundedSender<PoolSignal>,
    events: mpsc::UnboundedSender<NetworkBEvent>,
}

impl ShadowPool {
    /// Create an empty pool.
    ///
    /// Handshake results and timer expiries are sent on `signals`; events of
    /// every shadow connection are forwarded to `events`, tagged with the owner.
    pub fn new(
        connector: Arc<dyn ShadowConnector>,
        settings: PoolSettings,
        signals: mpsc::UnboundedSender<PoolSignal>,
        events: mpsc::UnboundedSender<NetworkBEvent>,
    ) -> Self {
        Self {
            connector,
            settings,
            connections: HashMap::new(),
            signals,
            events,
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Return the owner's connecting/ready connection, or start a new one.
    ///
    /// The record is inserted before the handshake task is spawned, so a second
    /// call for the same owner always finds it.
    #[instrument(skip(self, identity), fields(owner = %identity.id))]
    pub fn acquire(&mut self, identity: &Identity) -> Acquired {
        if let Some(conn) = self.connections.get_mut(&identity.id) {
            if conn.is_live() {
                conn.display_name = identity.display_name.clone();
                conn.last_activity_at = Utc::now();
                return Acquired::Existing(conn.info());
            }
        }

        let owner = identity.id.clone();
        let conn_id = ConnId::new();
        let nick = self.settings.nick_rule.nick_for(&identity.display_name);

        let request = ConnectRequest {
            nick: nick.clone(),
            server: self.settings.server.clone(),
            port: self.settings.port,
            tls: self.settings.tls,
            real_name: identity.display_name.clone(),
            channels: self.settings.channels.clone(),
        };
        let task = self.spawn_connect(owner.clone(), conn_id.clone(), request);

        let conn = ShadowConnection {
            owner: owner.clone(),
            conn_id,
            display_name: identity.display_name.clone(),
            nick,
            state: ConnectionState::Connecting,
            last_activity_at: Utc::now(),
            link: None,
            connect_task: Some(task),
            timer: None,
        };
        let info = conn.info();
        info!(nick = %info.nick, conn_id = %info.conn_id, "shadow connection spawned");
        // replaces (and aborts) a leftover record in a terminal state
        self.connections.insert(owner, conn);
        Acquired::Spawned(info)
    }

    fn spawn_connect(
        &self,
        owner: OwnerId,
        conn_id: ConnId,
        request: ConnectRequest,
    ) -> JoinHandle<()> {
        let connector = self.connector.clone();
        let policy = self.settings.backoff.clone();
        let origin = ShadowOrigin {
            owner: owner.clone(),
            conn_id: conn_id.clone(),
        };
        let sink = ShadowEventSink::new(Some(origin), self.events.clone());
        let signals = self.signals.clone();

        tokio::spawn(async move {
            let signal =
                match connect_with_backoff(connector.as_ref(), &request, &sink, &policy).await {
                    Ok(link) => PoolSignal::Connected {
                        owner,
                        conn_id,
                        link,
                    },
                    Err(error) => PoolSignal::ConnectFailed {
                        owner,
                        conn_id,
                        error,
                    },
                };
            if signals.send(signal).is_err() {
                debug!("pool owner gone, dropping connect result");
            }
        })
    }

    /// Record a finished handshake and start the inactivity timer.
    ///
    /// Returns `false` when `conn_id` is not the owner's current connecting
    /// connection; the orphaned link is then quit in the background.
    #[instrument(skip(self, link), fields(owner = %owner, conn_id = %conn_id))]
    pub fn mark_ready(
        &mut self,
        owner: &OwnerId,
        conn_id: &ConnId,
        link: Arc<dyn ShadowLink>,
    ) -> bool {
        let current = self.connections.get_mut(owner).filter(|c| {
            c.conn_id == *conn_id && c.state == ConnectionState::Connecting
        });

        let Some(conn) = current else {
            debug!("stale handshake completion, quitting orphaned link");
            tokio::spawn(async move {
                if let Err(e) = link.disconnect(SUPERSEDED_REASON).await {
                    debug!(error = %e, "orphaned link quit failed");
                }
            });
            return false;
        };

        conn.nick = link.nick().to_string();
        conn.link = Some(link);
        conn.state = ConnectionState::Ready;
        conn.connect_task = None;
        conn.last_activity_at = Utc::now();
        info!(nick = %conn.nick, "shadow connection ready");

        self.reset_inactivity_timer(owner);
        true
    }

    /// The handshake for `conn_id` gave up; drop the record.
    ///
    /// Returns the closed connection's snapshot, or `None` for a stale signal.
    #[instrument(skip(self, error), fields(owner = %owner, conn_id = %conn_id))]
    pub fn connect_failed(
        &mut self,
        owner: &OwnerId,
        conn_id: &ConnId,
        error: &NetworkError,
    ) -> Option<ShadowInfo> {
        if !self.is_current(owner, conn_id) {
            debug!("stale connect failure ignored");
            return None;
        }
        let mut conn = self.connections.remove(owner)?;
        conn.connect_task = None;
        conn.state = ConnectionState::Closed;
        warn!(nick = %conn.nick, error = %error, "shadow connection failed");
        Some(conn.info())
    }

    /// Quit the owner's connection with `reason` and remove it.
    ///
    /// Returns `false` when the owner had no connection.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn release(&mut self, owner: &OwnerId, reason: &str) -> bool {
        let Some(mut conn) = self.connections.remove(owner) else {
            return false;
        };

        conn.state = ConnectionState::Disconnecting;
        conn.abort_tasks();

        if let Some(link) = conn.link.take() {
            match tokio::time::timeout(self.settings.disconnect_timeout, link.disconnect(reason))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "network-B quit failed"),
                Err(_) => warn!(nick = %conn.nick, "network-B quit timed out"),
            }
        }

        conn.state = ConnectionState::Closed;
        info!(nick = %conn.nick, reason, "shadow connection released");
        true
    }

    /// Timer expiry for `conn_id`. Releases with [`AWAY_REASON`] only if that
    /// connection is still the owner's current, ready one.
    pub async fn expire(&mut self, owner: &OwnerId, conn_id: &ConnId) -> bool {
        let ready = self
            .connections
            .get(owner)
            .is_some_and(|c| c.conn_id == *conn_id && c.state == ConnectionState::Ready);
        if !ready {
            debug!(owner = %owner, conn_id = %conn_id, "stale inactivity timer ignored");
            return false;
        }
        info!(owner = %owner, "inactivity timeout");
        self.release(owner, AWAY_REASON).await
    }

    /// Release every connection. Returns how many were open.
    pub async fn shutdown(&mut self, reason: &str) -> usize {
        let owners: Vec<OwnerId> = self.connections.keys().cloned().collect();
        let count = owners.len();
        for owner in owners {
            self.release(&owner, reason).await;
        }
        count
    }

    // -----------------------------------------------------------------------
    // Inactivity timer
    // -----------------------------------------------------------------------

    /// (Re)start the owner's inactivity timer. Only ready connections have one.
    pub fn reset_inactivity_timer(&mut self, owner: &OwnerId) {
        let after = self.settings.inactivity_timeout;
        let signals = self.signals.clone();
        let Some(conn) = self.connections.get_mut(owner) else {
            return;
        };
        if conn.state != ConnectionState::Ready {
            return;
        }
        if let Some(old) = conn.timer.take() {
            old.abort();
        }
        conn.timer = Some(spawn_inactivity_timer(
            owner.clone(),
            conn.conn_id.clone(),
            after,
            signals,
        ));
    }

    pub fn clear_inactivity_timer(&mut self, owner: &OwnerId) {
        if let Some(timer) = self
            .connections
            .get_mut(owner)
            .and_then(|c| c.timer.take())
        {
            timer.abort();
        }
    }

    /// Note activity by the owner and push the timeout back.
    pub fn touch(&mut self, owner: &OwnerId) {
        if let Some(conn) = self.connections.get_mut(owner) {
            conn.last_activity_at = Utc::now();
        }
        self.reset_inactivity_timer(owner);
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    /// The owner's ready link together with the connection it belongs to.
    pub fn ready_link(&self, owner: &OwnerId) -> Result<(ConnId, Arc<dyn ShadowLink>)> {
        let conn = self
            .connections
            .get(owner)
            .ok_or_else(|| PoolError::NotFound {
                owner: owner.to_string(),
            })?;
        match (&conn.state, &conn.link) {
            (ConnectionState::Ready, Some(link)) => Ok((conn.conn_id.clone(), link.clone())),
            _ => Err(PoolError::NotReady {
                owner: owner.to_string(),
            }),
        }
    }

    /// Is `conn_id` the owner's current connection?
    pub fn is_current(&self, owner: &OwnerId, conn_id: &ConnId) -> bool {
        self.connections
            .get(owner)
            .is_some_and(|c| c.conn_id == *conn_id)
    }

    pub fn is_ready(&self, owner: &OwnerId) -> bool {
        self.connections
            .get(owner)
            .is_some_and(|c| c.state == ConnectionState::Ready)
    }

    /// Owner of a live shadow using `nick` (case-insensitive).
    pub fn owner_of_nick(&self, nick: &str) -> Option<&OwnerId> {
        self.connections
            .values()
            .find(|c| c.is_live() && c.nick.eq_ignore_ascii_case(nick))
            .map(|c| &c.owner)
    }

    /// Lowercased nick → display name for every live shadow.
    pub fn nick_directory(&self) -> HashMap<String, String> {
        self.connections
            .values()
            .filter(|c| c.is_live())
            .map(|c| (c.nick.to_lowercase(), c.display_name.clone()))
            .collect()
    }

    pub fn get(&self, owner: &OwnerId) -> Option<ShadowInfo> {
        self.connections.get(owner).map(ShadowConnection::info)
    }

    pub fn list(&self) -> Vec<ShadowInfo> {
        let mut infos: Vec<ShadowInfo> = self.connections.values().map(|c| c.info()).collect();
        infos.sort_by(|a, b| a.owner.cmp(&b.owner));
        infos
    }

    pub fn contains(&self, owner: &OwnerId) -> bool {
        self.connections.contains_key(owner)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

fn spawn_inactivity_timer(
    owner: OwnerId,
    conn_id: ConnId,
    after: Duration,
    signals: mpsc::UnboundedSender<PoolSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let _ = signals.send(PoolSignal::InactivityExpired { owner, conn_id });
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tandem_net::PresenceInfo;
    use tokio::sync::Notify;

    use super::*;

    #[derive(Default)]
    struct RecordingLink {
        nick: String,
        quits: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ShadowLink for RecordingLink {
        fn nick(&self) -> &str {
            &self.nick
        }
        async fn send(&self, _: &str, _: &str) -> tandem_net::Result<()> {
            Ok(())
        }
        async fn send_action(&self, _: &str, _: &str) -> tandem_net::Result<()> {
            Ok(())
        }
        async fn send_notice(&self, _: &str, _: &str) -> tandem_net::Result<()> {
            Ok(())
        }
        async fn join(&self, _: &str) -> tandem_net::Result<()> {
            Ok(())
        }
        async fn disconnect(&self, reason: &str) -> tandem_net::Result<()> {
            self.quits.lock().unwrap().push(reason.to_string());
            Ok(())
        }
        async fn whois(&self, _: &str) -> tandem_net::Result<Option<PresenceInfo>> {
            Ok(None)
        }
        async fn request_names(&self, _: &str) -> tandem_net::Result<()> {
            Ok(())
        }
        async fn topic(&self, _: &str) -> tandem_net::Result<Option<String>> {
            Ok(None)
        }
    }

    /// Blocks every connect until `gate` is notified, counting calls.
    struct GatedConnector {
        calls: AtomicUsize,
        gate: Notify,
    }

    #[async_trait]
    impl ShadowConnector for GatedConnector {
        async fn connect(
            &self,
            request: ConnectRequest,
            _events: ShadowEventSink,
        ) -> tandem_net::Result<Arc<dyn ShadowLink>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(Arc::new(RecordingLink {
                nick: request.nick,
                ..Default::default()
            }))
        }
    }

    fn settings() -> PoolSettings {
        PoolSettings {
            server: "irc.example.net".to_string(),
            port: 6667,
            tls: false,
            channels: vec!["#irc-general".to_string()],
            nick_rule: NickRule::new("-sl", 16),
            inactivity_timeout: Duration::from_secs(120),
            backoff: BackoffPolicy::once(),
            disconnect_timeout: Duration::from_secs(5),
        }
    }

    fn pool_with(
        connector: Arc<dyn ShadowConnector>,
    ) -> (ShadowPool, mpsc::UnboundedReceiver<PoolSignal>) {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        (
            ShadowPool::new(connector, settings(), signals_tx, events_tx),
            signals_rx,
        )
    }

    fn gated() -> Arc<GatedConnector> {
        Arc::new(GatedConnector {
            calls: AtomicUsize::new(0),
            gate: Notify::new(),
        })
    }

    fn bob() -> Identity {
        Identity::new("U1", "bob")
    }

    #[tokio::test]
    async fn repeated_acquire_is_single_flight() {
        let connector = gated();
        let (mut pool, _signals) = pool_with(connector.clone());

        let first = pool.acquire(&bob());
        assert!(first.is_spawned());
        assert_eq!(first.info().nick, "bob-sl");
        for _ in 0..10 {
            let again = pool.acquire(&bob());
            assert!(!again.is_spawned());
            assert_eq!(again.info().conn_id, first.info().conn_id);
        }

        tokio::task::yield_now().await;
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn handshake_completion_marks_ready() {
        let connector = gated();
        let (mut pool, mut signals) = pool_with(connector.clone());
        let owner = OwnerId::from("U1");

        pool.acquire(&bob());
        tokio::task::yield_now().await;
        connector.gate.notify_one();

        match signals.recv().await {
            Some(PoolSignal::Connected {
                owner: o,
                conn_id,
                link,
            }) => {
                assert_eq!(o, owner);
                assert!(pool.mark_ready(&o, &conn_id, link));
            }
            other => panic!("unexpected signal: {:?}", other),
        }
        assert!(pool.is_ready(&owner));
        assert!(pool.ready_link(&owner).is_ok());
        assert_eq!(pool.owner_of_nick("BOB-SL"), Some(&owner));
        assert_eq!(
            pool.nick_directory().get("bob-sl").map(String::as_str),
            Some("bob")
        );
    }

    #[tokio::test]
    async fn stale_completion_is_a_no_op_and_quits_the_orphan() {
        let connector = gated();
        let (mut pool, _signals) = pool_with(connector);
        let owner = OwnerId::from("U1");
        pool.acquire(&bob());

        let orphan = Arc::new(RecordingLink {
            nick: "bob-sl".to_string(),
            ..Default::default()
        });
        assert!(!pool.mark_ready(&owner, &ConnId::new(), orphan.clone()));
        assert!(!pool.is_ready(&owner));

        tokio::task::yield_now().await;
        assert_eq!(*orphan.quits.lock().unwrap(), vec![SUPERSEDED_REASON]);
    }

    #[tokio::test]
    async fn release_is_idempotent_and_quits_with_reason() {
        let (mut pool, _signals) = pool_with(gated());
        let owner = OwnerId::from("U1");
        let conn_id = pool.acquire(&bob()).info().conn_id.clone();
        let link = Arc::new(RecordingLink {
            nick: "bob-sl".to_string(),
            ..Default::default()
        });
        assert!(pool.mark_ready(&owner, &conn_id, link.clone()));

        assert!(pool.release(&owner, "reset").await);
        assert!(!pool.release(&owner, "reset").await);
        assert_eq!(*link.quits.lock().unwrap(), vec!["reset"]);
        assert!(pool.is_empty());

        // a fresh acquire after close allocates a new connection object
        let again = pool.acquire(&bob());
        assert!(again.is_spawned());
        assert_ne!(again.info().conn_id, conn_id);
    }

    #[tokio::test]
    async fn connect_failure_for_current_connection_closes_it() {
        let (mut pool, _signals) = pool_with(gated());
        let owner = OwnerId::from("U1");
        let conn_id = pool.acquire(&bob()).info().conn_id.clone();
        let error = NetworkError::NicknameInUse("bob-sl".into());

        assert!(pool.connect_failed(&owner, &ConnId::new(), &error).is_none());
        assert!(pool.contains(&owner));

        let closed = pool.connect_failed(&owner, &conn_id, &error).unwrap();
        assert_eq!(closed.state, ConnectionState::Closed);
        assert!(!pool.contains(&owner));
    }

    #[tokio::test(start_paused = true)]
    async fn inactivity_expiry_releases_exactly_once() {
        let (mut pool, mut signals) = pool_with(gated());
        let owner = OwnerId::from("U1");
        let conn_id = pool.acquire(&bob()).info().conn_id.clone();
        let link = Arc::new(RecordingLink {
            nick: "bob-sl".to_string(),
            ..Default::default()
        });
        pool.mark_ready(&owner, &conn_id, link.clone());

        tokio::time::sleep(Duration::from_secs(121)).await;
        let Some(PoolSignal::InactivityExpired { owner: o, conn_id: c }) = signals.recv().await
        else {
            panic!("expected inactivity signal");
        };
        assert!(pool.expire(&o, &c).await);
        assert!(!pool.expire(&o, &c).await);
        assert_eq!(*link.quits.lock().unwrap(), vec![AWAY_REASON]);
    }

    #[tokio::test(start_paused = true)]
    async fn touch_pushes_the_timeout_back() {
        let (mut pool, mut signals) = pool_with(gated());
        let owner = OwnerId::from("U1");
        let conn_id = pool.acquire(&bob()).info().conn_id.clone();
        pool.mark_ready(&owner, &conn_id, Arc::new(RecordingLink::default()));

        tokio::time::sleep(Duration::from_secs(100)).await;
        pool.touch(&owner);
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert!(signals.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert!(matches!(
            signals.try_recv(),
            Ok(PoolSignal::InactivityExpired { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_timer_never_fires() {
        let (mut pool, mut signals) = pool_with(gated());
        let owner = OwnerId::from("U1");
        let conn_id = pool.acquire(&bob()).info().conn_id.clone();
        pool.mark_ready(&owner, &conn_id, Arc::new(RecordingLink::default()));
        pool.clear_inactivity_timer(&owner);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(signals.try_recv().is_err());
        assert!(pool.is_ready(&owner));
    }

    #[tokio::test]
    async fn shutdown_releases_everything() {
        let (mut pool, _signals) = pool_with(gated());
        pool.acquire(&bob());
        pool.acquire(&Identity::new("U2", "Ana"));
        assert_eq!(pool.shutdown("bridge shutting down").await, 2);
        assert!(pool.is_empty());
    }
}
