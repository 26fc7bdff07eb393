//! `RelayEngine`: one bridge's event loop.
//!
//! Everything that mutates bridge state (pool, queue, membership) happens on
//! the task running [`RelayEngine::run`]. Network clients and spawned helper
//! tasks only ever talk to it through channels:
//!
//! - network A pushes [`HomeEvent`]s into the sender from [`RelayEngine::home_sender`]
//! - every network-B connection pushes tagged [`NetworkBEvent`]s
//! - the pool's handshake and timer tasks push [`PoolSignal`]s
//! - the listener connect task pushes its result

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use tandem_core::{
    Attachment, Identity, MessageEnvelope, MessageKind, OwnerId, PresenceState, TandemConfig,
};
use tandem_format::{split_line, to_network_a, to_network_b, NickRule, ReferenceResolver};
use tandem_net::{
    connect_with_backoff, BackoffPolicy, ConnectRequest, HomeEvent, HomeNetwork, NetworkBEvent,
    NetworkError, SendOptions, ShadowConnector, ShadowEvent, ShadowEventSink, ShadowLink,
    ShadowOrigin,
};
use tandem_pool::{
    OutboundQueue, PoolSettings, PoolSignal, SendOutcome, ShadowPool, AWAY_REASON,
};

use crate::channel_map::ChannelMap;
use crate::commands::{help_text, parse_command, Command, ParsedCommand};
use crate::error::Result;
use crate::members::Membership;

/// Quit message for every connection when the bridge stops.
pub const SHUTDOWN_REASON: &str = "bridge shutting down";

const RESET_REASON: &str = "reset";
const LINK_LOST_REASON: &str = "connection lost";
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const LISTENER_REAL_NAME: &str = "tandem bridge";

/// One unit of work for the engine.
pub enum RelayEvent {
    Home(HomeEvent),
    Shadow(NetworkBEvent),
    Pool(PoolSignal),
    Listener(std::result::Result<Arc<dyn ShadowLink>, NetworkError>),
    PollNames,
}

/// Config values the engine consults on every event.
#[derive(Debug, Clone)]
struct RelaySettings {
    bot_nick: String,
    server: String,
    port: u16,
    tls: bool,
    status_notices: bool,
    presence_connect: bool,
    prefixes: Vec<char>,
    line_budget: usize,
    send_attempts: u32,
    names_poll: Duration,
    nick_rule: NickRule,
    backoff: BackoffPolicy,
}

impl RelaySettings {
    fn from_config(config: &TandemConfig) -> Self {
        let b = &config.network_b;
        Self {
            bot_nick: b.bot_nick.clone(),
            server: b.server.clone(),
            port: b.port,
            tls: b.tls,
            status_notices: config.network_a.status_notices,
            presence_connect: config.network_a.presence_connect,
            prefixes: config.command_prefix_chars(),
            line_budget: b.line_budget,
            send_attempts: b.send_attempts,
            names_poll: Duration::from_secs(b.names_poll_secs.max(1)),
            nick_rule: NickRule::new(b.nick_suffix.clone(), b.max_nick_len),
            backoff: BackoffPolicy::new(
                b.connect_attempts,
                Duration::from_secs(b.backoff_base_secs),
                Duration::from_secs(b.backoff_max_secs),
            ),
        }
    }
}

/// Resolves `<@U…>` / `<#C…>` tokens through the network-A client.
struct HomeResolver(Arc<dyn HomeNetwork>);

#[async_trait]
impl ReferenceResolver for HomeResolver {
    async fn user_name(&self, user_id: &str) -> Option<String> {
        match self.0.lookup_user(user_id).await {
            Ok(identity) => Some(identity.display_name),
            Err(e) => {
                debug!(user_id, error = %e, "user reference lookup failed");
                None
            }
        }
    }

    async fn channel_name(&self, channel_id: &str) -> Option<String> {
        match self.0.lookup_channel(channel_id).await {
            Ok(info) => Some(info.name),
            Err(e) => {
                debug!(channel_id, error = %e, "channel reference lookup failed");
                None
            }
        }
    }
}

enum Wake {
    Event(RelayEvent),
    Idle,
    Stop,
}

pub struct RelayEngine {
    settings: RelaySettings,
    map: Arc<ChannelMap>,
    home: Arc<dyn HomeNetwork>,
    connector: Arc<dyn ShadowConnector>,
    pool: ShadowPool,
    queue: OutboundQueue,
    members: Membership,
    /// Network-A channel id → name.
    channel_names: HashMap<String, String>,
    listener: Option<Arc<dyn ShadowLink>>,
    listener_task: Option<JoinHandle<()>>,
    /// Owners reconnected after a lost link and not yet delivered to since.
    relinked: HashSet<OwnerId>,

    home_tx: mpsc::UnboundedSender<HomeEvent>,
    home_rx: mpsc::UnboundedReceiver<HomeEvent>,
    shadow_tx: mpsc::UnboundedSender<NetworkBEvent>,
    shadow_rx: mpsc::UnboundedReceiver<NetworkBEvent>,
    signals_rx: mpsc::UnboundedReceiver<PoolSignal>,
    listener_tx: mpsc::UnboundedSender<std::result::Result<Arc<dyn ShadowLink>, NetworkError>>,
    listener_rx: mpsc::UnboundedReceiver<std::result::Result<Arc<dyn ShadowLink>, NetworkError>>,
}

impl RelayEngine {
    /// Build an engine for one bridge. Fails on an invalid configuration.
    pub fn new(
        config: &TandemConfig,
        home: Arc<dyn HomeNetwork>,
        connector: Arc<dyn ShadowConnector>,
    ) -> Result<Self> {
        config.validate()?;
        let map = Arc::new(ChannelMap::from_pairs(&config.channels)?);
        let settings = RelaySettings::from_config(config);

        let (home_tx, home_rx) = mpsc::unbounded_channel();
        let (shadow_tx, shadow_rx) = mpsc::unbounded_channel();
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let (listener_tx, listener_rx) = mpsc::unbounded_channel();

        let pool = ShadowPool::new(
            connector.clone(),
            PoolSettings {
                server: settings.server.clone(),
                port: settings.port,
                tls: settings.tls,
                channels: map.b_channels(),
                nick_rule: settings.nick_rule.clone(),
                inactivity_timeout: Duration::from_secs(config.network_a.inactivity_timeout_secs),
                backoff: settings.backoff.clone(),
                disconnect_timeout: DISCONNECT_TIMEOUT,
            },
            signals_tx,
            shadow_tx.clone(),
        );

        Ok(Self {
            settings,
            map,
            home,
            connector,
            pool,
            queue: OutboundQueue::with_max_attempts(config.network_b.send_attempts),
            members: Membership::new(),
            channel_names: HashMap::new(),
            listener: None,
            listener_task: None,
            relinked: HashSet::new(),
            home_tx,
            home_rx,
            shadow_tx,
            shadow_rx,
            signals_rx,
            listener_tx,
            listener_rx,
        })
    }

    /// Where the network-A client should push its events.
    pub fn home_sender(&self) -> mpsc::UnboundedSender<HomeEvent> {
        self.home_tx.clone()
    }

    pub fn channel_map(&self) -> Arc<ChannelMap> {
        self.map.clone()
    }

    pub fn pool(&self) -> &ShadowPool {
        &self.pool
    }

    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    pub fn members(&self) -> &Membership {
        &self.members
    }

    pub fn listener_ready(&self) -> bool {
        self.listener.is_some()
    }

    // -----------------------------------------------------------------------
    // Loop
    // -----------------------------------------------------------------------

    /// Start the listener connection. [`RelayEngine::run`] calls this itself.
    pub fn start(&mut self) {
        self.connect_listener();
    }

    /// Process events until `shutdown` flips to `true`, then release everything.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(channels = self.map.len(), "relay engine started");
        self.start();

        let period = self.settings.names_poll;
        let mut poll = interval_at(Instant::now() + period, period);

        loop {
            let wake = tokio::select! {
                event = self.next_event() => match event {
                    Some(event) => Wake::Event(event),
                    None => Wake::Stop,
                },
                _ = poll.tick() => Wake::Event(RelayEvent::PollNames),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        Wake::Stop
                    } else {
                        Wake::Idle
                    }
                }
            };

            match wake {
                Wake::Event(event) => self.handle(event).await,
                Wake::Idle => {}
                Wake::Stop => break,
            }
        }

        self.shutdown().await;
    }

    /// Wait for and process one internal or inbound event.
    pub async fn step(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.handle(event).await;
                true
            }
            None => false,
        }
    }

    async fn next_event(&mut self) -> Option<RelayEvent> {
        tokio::select! {
            biased;
            Some(signal) = self.signals_rx.recv() => Some(RelayEvent::Pool(signal)),
            Some(result) = self.listener_rx.recv() => Some(RelayEvent::Listener(result)),
            Some(event) = self.shadow_rx.recv() => Some(RelayEvent::Shadow(event)),
            Some(event) = self.home_rx.recv() => Some(RelayEvent::Home(event)),
            else => None,
        }
    }

    /// Single dispatch point for every event kind.
    pub async fn handle(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Home(event) => self.on_home(event).await,
            RelayEvent::Shadow(NetworkBEvent { origin, event }) => {
                self.on_shadow(origin, event).await
            }
            RelayEvent::Pool(signal) => self.on_pool_signal(signal).await,
            RelayEvent::Listener(result) => self.on_listener(result).await,
            RelayEvent::PollNames => self.poll_names().await,
        }
    }

    /// Release every shadow and the listener.
    pub async fn shutdown(&mut self) {
        if let Some(task) = self.listener_task.take() {
            task.abort();
        }
        let released = self.pool.shutdown(SHUTDOWN_REASON).await;
        if let Some(listener) = self.listener.take() {
            if let Err(e) = listener.disconnect(SHUTDOWN_REASON).await {
                debug!(error = %e, "listener quit failed");
            }
        }
        let pending: usize = self
            .queue
            .owners()
            .map(|owner| self.queue.pending(owner))
            .sum();
        info!(released, pending, "relay engine stopped");
    }

    // -----------------------------------------------------------------------
    // Network A
    // -----------------------------------------------------------------------

    async fn on_home(&mut self, event: HomeEvent) {
        match event {
            HomeEvent::Message {
                user_id,
                channel_id,
                text,
                kind,
                attachments,
                from_bot,
            } => {
                if from_bot {
                    return;
                }
                self.on_home_message(&user_id, &channel_id, &text, kind, attachments)
                    .await
            }
            HomeEvent::Presence { user_id, presence } => {
                self.on_presence(&user_id, presence).await
            }
            HomeEvent::Typing {
                user_id,
                channel_id,
            } => self.on_typing(&user_id, &channel_id).await,
        }
    }

    async fn on_home_message(
        &mut self,
        user_id: &str,
        channel_id: &str,
        text: &str,
        kind: MessageKind,
        attachments: Vec<Attachment>,
    ) {
        let Some(channel) = self.channel_name(channel_id).await else {
            return;
        };
        let Some(b_channel) = self.map.to_b(&channel).map(str::to_string) else {
            info!(channel = %channel, "message in unmapped channel dropped");
            return;
        };
        let Some(identity) = self.identity(user_id).await else {
            return;
        };

        match parse_command(text, &self.settings.prefixes) {
            ParsedCommand::NotCommand => {}
            ParsedCommand::Command(command) => {
                self.dispatch(&identity, &channel, &b_channel, command).await;
                return;
            }
            ParsedCommand::Unknown(verb) => {
                debug!(owner = %identity.id, verb = %verb, "unknown command dropped");
                return;
            }
            ParsedCommand::Malformed(verb) => {
                debug!(owner = %identity.id, verb, "malformed command dropped");
                return;
            }
        }

        let resolver = HomeResolver(self.home.clone());
        let converted = to_network_b(text, &resolver, &self.settings.nick_rule).await;
        if converted.is_empty() && attachments.is_empty() {
            return;
        }

        let mut envelope = MessageEnvelope::new(identity.id.clone(), channel, converted)
            .with_kind(kind);
        envelope.attachments = attachments;

        self.queue.enqueue(&identity.id, &b_channel, envelope);
        self.ensure_connection(&identity);
        self.flush(&identity.id).await;
    }

    async fn on_presence(&mut self, user_id: &str, presence: PresenceState) {
        let owner = OwnerId::from(user_id);
        match presence {
            PresenceState::Active if self.settings.presence_connect => {
                if let Some(identity) = self.identity(user_id).await {
                    self.ensure_connection(&identity);
                }
            }
            PresenceState::Away => {
                self.relinked.remove(&owner);
                if self.pool.release(&owner, AWAY_REASON).await {
                    self.queue.collect_garbage(&owner, true);
                }
            }
            _ => {}
        }
    }

    async fn on_typing(&mut self, user_id: &str, channel_id: &str) {
        let owner = OwnerId::from(user_id);
        if self.pool.contains(&owner) {
            self.pool.touch(&owner);
            return;
        }
        if !self.settings.presence_connect {
            return;
        }
        let Some(channel) = self.channel_name(channel_id).await else {
            return;
        };
        if self.map.to_b(&channel).is_none() {
            return;
        }
        if let Some(identity) = self.identity(user_id).await {
            self.ensure_connection(&identity);
        }
    }

    async fn identity(&mut self, user_id: &str) -> Option<Identity> {
        match self.home.lookup_user(user_id).await {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(user_id, error = %e, "user lookup failed, event dropped");
                None
            }
        }
    }

    async fn channel_name(&mut self, channel_id: &str) -> Option<String> {
        if let Some(name) = self.channel_names.get(channel_id) {
            return Some(name.clone());
        }
        match self.home.lookup_channel(channel_id).await {
            Ok(info) => {
                self.channel_names
                    .insert(channel_id.to_string(), info.name.clone());
                Some(info.name)
            }
            Err(e) => {
                warn!(channel_id, error = %e, "channel lookup failed, event dropped");
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Shadow connections
    // -----------------------------------------------------------------------

    fn ensure_connection(&mut self, identity: &Identity) {
        if !self.pool.acquire(identity).is_spawned() {
            self.pool.touch(&identity.id);
        }
    }

    /// Send whatever is queued for `owner` if its connection is ready.
    async fn flush(&mut self, owner: &OwnerId) {
        let Ok((conn_id, link)) = self.pool.ready_link(owner) else {
            return;
        };
        let budget = self.settings.line_budget;

        let report = self
            .queue
            .drain(owner, |destination, envelope| {
                let link = link.clone();
                async move { deliver(link.as_ref(), &destination, &envelope, budget).await }
            })
            .await;

        if report.sent > 0 || report.dropped > 0 {
            debug!(
                owner = %owner,
                conn_id = %conn_id,
                sent = report.sent,
                dropped = report.dropped,
                remaining = report.remaining,
                "queue drained"
            );
        }
        if report.sent > 0 {
            self.relinked.remove(owner);
        }

        for (destination, envelope) in &report.abandoned {
            let notice = format!(
                "Could not deliver your message to {} after {} attempts: {}",
                destination, self.settings.send_attempts, envelope.raw_text
            );
            self.notify(owner, &notice).await;
        }

        if report.halted {
            self.relink(owner).await;
        }
    }

    /// Replace a connection whose link stopped accepting sends, keeping its queue.
    ///
    /// One automatic reconnect per loss streak; after that the owner's next
    /// activity reconnects.
    async fn relink(&mut self, owner: &OwnerId) {
        let Some(info) = self.pool.get(owner) else {
            return;
        };
        warn!(
            owner = %owner,
            nick = %info.nick,
            pending = self.queue.pending(owner),
            "network-B link lost"
        );
        self.pool.release(owner, LINK_LOST_REASON).await;
        if !self.relinked.insert(owner.clone()) {
            debug!(owner = %owner, "link lost again, waiting for activity");
            return;
        }
        self.pool
            .acquire(&Identity::new(info.owner, info.display_name));
    }

    async fn on_pool_signal(&mut self, signal: PoolSignal) {
        match signal {
            PoolSignal::Connected {
                owner,
                conn_id,
                link,
            } => {
                if self.pool.mark_ready(&owner, &conn_id, link) {
                    self.flush(&owner).await;
                }
            }
            PoolSignal::ConnectFailed {
                owner,
                conn_id,
                error,
            } => {
                let Some(closed) = self.pool.connect_failed(&owner, &conn_id, &error) else {
                    return;
                };
                let notice = if error.is_nick_rejection() {
                    format!(
                        "Could not connect to the other network as {}: {}. {} queued message(s) are kept and will be retried after your next message or {}reset.",
                        closed.nick,
                        error,
                        self.queue.pending(&owner),
                        self.settings.prefixes.first().copied().unwrap_or('.')
                    )
                } else {
                    format!(
                        "Could not connect to the other network as {}: {}. Queued messages will be sent after your next message.",
                        closed.nick, error
                    )
                };
                self.notify(&owner, &notice).await;
            }
            PoolSignal::InactivityExpired { owner, conn_id } => {
                if self.pool.expire(&owner, &conn_id).await {
                    self.relinked.remove(&owner);
                    self.queue.collect_garbage(&owner, true);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Listener
    // -----------------------------------------------------------------------

    fn connect_listener(&mut self) {
        if self.listener.is_some() || self.listener_task.is_some() {
            return;
        }
        let request = ConnectRequest {
            nick: self.settings.bot_nick.clone(),
            server: self.settings.server.clone(),
            port: self.settings.port,
            tls: self.settings.tls,
            real_name: LISTENER_REAL_NAME.to_string(),
            channels: self.map.b_channels(),
        };
        let connector = self.connector.clone();
        let sink = ShadowEventSink::new(None, self.shadow_tx.clone());
        let policy = self.settings.backoff.clone();
        let tx = self.listener_tx.clone();

        self.listener_task = Some(tokio::spawn(async move {
            let result = connect_with_backoff(connector.as_ref(), &request, &sink, &policy).await;
            let _ = tx.send(result);
        }));
    }

    async fn on_listener(&mut self, result: std::result::Result<Arc<dyn ShadowLink>, NetworkError>) {
        self.listener_task = None;
        match result {
            Ok(link) => {
                info!(nick = %link.nick(), "listener connection ready");
                self.listener = Some(link);
                self.poll_names().await;
            }
            Err(e) => {
                error!(error = %e, "listener connection failed, retrying at next names poll");
            }
        }
    }

    async fn poll_names(&mut self) {
        let Some(listener) = self.listener.clone() else {
            self.connect_listener();
            return;
        };
        for channel in self.map.b_channels() {
            if let Err(e) = listener.request_names(&channel).await {
                debug!(channel = %channel, error = %e, "names request failed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Network B
    // -----------------------------------------------------------------------

    async fn on_shadow(&mut self, origin: Option<ShadowOrigin>, event: ShadowEvent) {
        if let Some(o) = &origin {
            if !self.pool.is_current(&o.owner, &o.conn_id) {
                debug!(owner = %o.owner, conn_id = %o.conn_id, "event from replaced connection ignored");
                return;
            }
        }
        let from_listener = origin.is_none();

        match event {
            ShadowEvent::Message {
                target,
                nick,
                text,
                kind,
            } => {
                if is_channel(&target) {
                    if from_listener {
                        self.relay_to_home(&target, &nick, &text, kind).await;
                    }
                } else if let Some(o) = origin {
                    self.relay_private(&o.owner, &nick, &text, kind).await;
                } else {
                    debug!(nick = %nick, "private message to the bridge ignored");
                }
            }
            ShadowEvent::Join { channel, nick } if from_listener => {
                self.members.join(&channel, &nick);
                self.status_notice(&channel, &nick, format!("{} has joined {}", nick, channel))
                    .await;
            }
            ShadowEvent::Part {
                channel,
                nick,
                reason,
            } if from_listener => {
                self.members.part(&channel, &nick);
                let line = format!("{} has left {}{}", nick, channel, with_reason(&reason));
                self.status_notice(&channel, &nick, line).await;
            }
            ShadowEvent::Quit { nick, reason } if from_listener => {
                for channel in self.members.quit(&nick) {
                    let line = format!("{} has quit{}", nick, with_reason(&reason));
                    self.status_notice(&channel, &nick, line).await;
                }
            }
            ShadowEvent::Kick {
                channel,
                nick,
                by,
                reason,
            } if from_listener => {
                self.members.part(&channel, &nick);
                if let Some(owner) = self.pool.owner_of_nick(&nick).cloned() {
                    let line = format!("You were kicked from {} by {}{}", channel, by, with_reason(&reason));
                    self.notify(&owner, &line).await;
                }
                let line = format!("{} was kicked from {} by {}{}", nick, channel, by, with_reason(&reason));
                self.status_notice(&channel, &nick, line).await;
            }
            ShadowEvent::NickChange { old, new } if from_listener => {
                self.members.rename(&old, &new);
            }
            ShadowEvent::Names { channel, nicks } => {
                self.members.set_names(&channel, &nicks);
            }
            ShadowEvent::Invite { channel, by } => self.on_invite(origin, &channel, &by).await,
            ShadowEvent::Disconnected { reason } => match origin {
                Some(o) => {
                    warn!(owner = %o.owner, reason = %reason, "shadow connection dropped");
                    self.pool.release(&o.owner, &reason).await;
                }
                None => {
                    warn!(reason = %reason, "listener connection dropped, reconnecting");
                    self.listener = None;
                    self.connect_listener();
                }
            },
            // membership changes as seen by individual shadows duplicate the listener's view
            _ => {}
        }
    }

    async fn relay_to_home(&self, b_channel: &str, nick: &str, text: &str, kind: MessageKind) {
        let Some(a_channel) = self.map.to_a(b_channel).map(str::to_string) else {
            debug!(channel = %b_channel, "message in unmapped network-B channel dropped");
            return;
        };
        if self.is_bridge_nick(nick) {
            debug!(nick = %nick, "echo of a bridged message dropped");
            return;
        }
        let Some(line) = self.render_for_home(text, kind) else {
            return;
        };
        if let Err(e) = self
            .home
            .send_message(&a_channel, &line, &SendOptions::as_user(nick))
            .await
        {
            warn!(channel = %a_channel, error = %e, "relay to network A failed");
        }
    }

    async fn relay_private(&self, owner: &OwnerId, nick: &str, text: &str, kind: MessageKind) {
        let Some(line) = self.render_for_home(text, kind) else {
            return;
        };
        let dm = match self.home.open_direct_message(owner.as_str()).await {
            Ok(dm) => dm,
            Err(e) => {
                warn!(owner = %owner, error = %e, "could not open direct message");
                return;
            }
        };
        if let Err(e) = self
            .home
            .send_message(&dm, &line, &SendOptions::as_user(nick))
            .await
        {
            warn!(owner = %owner, error = %e, "private relay to network A failed");
        }
    }

    fn render_for_home(&self, text: &str, kind: MessageKind) -> Option<String> {
        let converted = to_network_a(text, &self.pool.nick_directory(), &self.settings.nick_rule);
        let converted = converted.trim();
        if converted.is_empty() {
            return None;
        }
        Some(match kind {
            MessageKind::Action => format!("_{}_", converted),
            MessageKind::Normal | MessageKind::Notice => converted.to_string(),
        })
    }

    /// Relay a join/part/quit/kick line when enabled, skipping the bridge's own nicks.
    async fn status_notice(&self, b_channel: &str, nick: &str, line: String) {
        if !self.settings.status_notices
            || self.is_bridge_nick(nick)
            || self.settings.nick_rule.is_virtual(nick)
        {
            return;
        }
        let Some(a_channel) = self.map.to_a(b_channel) else {
            return;
        };
        let text = format!("_{}_", line);
        if let Err(e) = self
            .home
            .send_message(a_channel, &text, &SendOptions::status())
            .await
        {
            debug!(channel = %a_channel, error = %e, "status notice failed");
        }
    }

    async fn on_invite(&mut self, origin: Option<ShadowOrigin>, channel: &str, by: &str) {
        if self.map.to_a(channel).is_none() {
            info!(channel = %channel, by = %by, "invite to unmapped channel ignored");
            return;
        }
        let link = match origin {
            Some(o) => self.pool.ready_link(&o.owner).ok().map(|(_, link)| link),
            None => self.listener.clone(),
        };
        let Some(link) = link else {
            return;
        };
        info!(channel = %channel, by = %by, nick = %link.nick(), "joining on invite");
        if let Err(e) = link.join(channel).await {
            warn!(channel = %channel, error = %e, "join on invite failed");
        }
    }

    fn is_bridge_nick(&self, nick: &str) -> bool {
        nick.eq_ignore_ascii_case(&self.settings.bot_nick) || self.pool.owner_of_nick(nick).is_some()
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    async fn dispatch(
        &mut self,
        identity: &Identity,
        a_channel: &str,
        b_channel: &str,
        command: Command,
    ) {
        let owner = &identity.id;
        debug!(owner = %owner, command = ?command, "bridge command");

        match command {
            Command::Help => {
                let prefix = self.settings.prefixes.first().copied().unwrap_or('.');
                self.notify(owner, &help_text(prefix)).await;
            }
            Command::Online { query } => {
                let query = query.map(|q| q.to_lowercase());
                let nicks: Vec<String> = self
                    .members
                    .nicks(b_channel)
                    .into_iter()
                    .filter(|n| {
                        !self.is_bridge_nick(n) && !self.settings.nick_rule.is_virtual(n)
                    })
                    .filter(|n| {
                        query
                            .as_deref()
                            .map_or(true, |q| n.to_lowercase().contains(q))
                    })
                    .collect();
                let reply = if nicks.is_empty() {
                    format!("No one matching is online in {}", b_channel)
                } else {
                    format!(
                        "Online in {} ({}): {}",
                        b_channel,
                        nicks.len(),
                        nicks.join(", ")
                    )
                };
                self.notify(owner, &reply).await;
            }
            Command::Topic => {
                let link = self
                    .listener
                    .clone()
                    .or_else(|| self.pool.ready_link(owner).ok().map(|(_, link)| link));
                let Some(link) = link else {
                    debug!(owner = %owner, "topic requested with no network-B connection");
                    return;
                };
                let reply = match link.topic(b_channel).await {
                    Ok(Some(topic)) => format!(
                        "Topic for {}: {}",
                        b_channel,
                        to_network_a(&topic, &self.pool.nick_directory(), &self.settings.nick_rule)
                    ),
                    Ok(None) => format!("No topic is set for {}", b_channel),
                    Err(e) => {
                        debug!(channel = %b_channel, error = %e, "topic lookup failed");
                        return;
                    }
                };
                self.notify(owner, &reply).await;
            }
            Command::Reset => {
                self.pool.release(owner, RESET_REASON).await;
                let nick = self.pool.acquire(identity).info().nick.clone();
                self.notify(owner, &format!("Reconnecting as {}", nick)).await;
            }
            Command::Msg { target, text } => {
                if !self.is_present(&target).await {
                    self.notify(owner, &format!("{} is not online", target)).await;
                    return;
                }
                let resolver = HomeResolver(self.home.clone());
                let converted = to_network_b(&text, &resolver, &self.settings.nick_rule).await;
                let envelope = MessageEnvelope::new(owner.clone(), a_channel, converted);
                self.queue.enqueue(owner, &target, envelope);
                self.ensure_connection(identity);
                self.flush(owner).await;
            }
        }
    }

    /// Is `nick` on network B? Asks the server when possible.
    async fn is_present(&self, nick: &str) -> bool {
        if let Some(listener) = &self.listener {
            match listener.whois(nick).await {
                Ok(found) => return found.is_some(),
                Err(e) => debug!(nick = %nick, error = %e, "whois failed, using membership"),
            }
        }
        self.members.is_online(nick)
    }

    /// Best-effort private note to a network-A user.
    async fn notify(&self, owner: &OwnerId, text: &str) {
        let dm = match self.home.open_direct_message(owner.as_str()).await {
            Ok(dm) => dm,
            Err(e) => {
                debug!(owner = %owner, error = %e, "could not open direct message");
                return;
            }
        };
        if let Err(e) = self
            .home
            .send_message(&dm, text, &SendOptions::default())
            .await
        {
            debug!(owner = %owner, error = %e, "private reply failed");
        }
    }
}

fn is_channel(target: &str) -> bool {
    target.starts_with('#') || target.starts_with('&')
}

fn with_reason(reason: &Option<String>) -> String {
    match reason.as_deref().map(str::trim) {
        Some(r) if !r.is_empty() => format!(" ({})", r),
        _ => String::new(),
    }
}

/// Send one envelope as one or more network-B lines.
async fn deliver(
    link: &dyn ShadowLink,
    destination: &str,
    envelope: &MessageEnvelope,
    budget: usize,
) -> SendOutcome {
    let lines = split_line(&envelope.rendered_text(), budget);
    if lines.is_empty() {
        return SendOutcome::Dropped;
    }
    for line in &lines {
        let sent = match envelope.kind {
            MessageKind::Normal => link.send(destination, line).await,
            MessageKind::Action => link.send_action(destination, line).await,
            MessageKind::Notice => link.send_notice(destination, line).await,
        };
        if let Err(e) = sent {
            warn!(destination, nick = %link.nick(), error = %e, "network-B send failed");
            return match e {
                NetworkError::Closed | NetworkError::ConnectionFailed(_) => SendOutcome::Halt,
                _ => SendOutcome::Deferred,
            };
        }
    }
    SendOutcome::Sent
}
