// In-memory network-A and network-B clients for driving the relay engine.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use tandem_core::{Identity, MessageKind, OwnerId, TandemConfig};
use tandem_net::{
    ChannelInfo, ConnectRequest, HomeEvent, HomeNetwork, NetworkError, PresenceInfo, Result,
    SendOptions, ShadowConnector, ShadowEventSink, ShadowLink,
};
use tandem_relay::{RelayEngine, RelayEvent};

pub const BOT_NICK: &str = "tandem";

pub fn config() -> TandemConfig {
    TandemConfig::from_toml_str(
        r##"
        [network_a]
        bot_token = "xoxb-test"

        [network_b]
        server = "irc.example.net"
        bot_nick = "tandem"
        connect_attempts = 1

        [channels]
        "#general" = "#irc-general"
        "##,
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// Network A
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomePost {
    pub target: String,
    pub text: String,
    pub options: SendOptions,
}

pub struct FakeHome {
    users: HashMap<String, String>,
    channels: HashMap<String, String>,
    posts: Mutex<Vec<HomePost>>,
}

impl FakeHome {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            users: HashMap::from([
                ("U1".to_string(), "bob".to_string()),
                ("U2".to_string(), "Ana".to_string()),
            ]),
            channels: HashMap::from([
                ("C1".to_string(), "general".to_string()),
                ("C9".to_string(), "offtopic".to_string()),
            ]),
            posts: Mutex::new(Vec::new()),
        })
    }

    pub fn posts(&self) -> Vec<HomePost> {
        self.posts.lock().unwrap().clone()
    }

    /// Direct messages to `user_id`, text only.
    pub fn dms_to(&self, user_id: &str) -> Vec<String> {
        let dm = dm_channel(user_id);
        self.posts()
            .into_iter()
            .filter(|p| p.target == dm)
            .map(|p| p.text)
            .collect()
    }
}

pub fn dm_channel(user_id: &str) -> String {
    format!("D-{}", user_id)
}

#[async_trait]
impl HomeNetwork for FakeHome {
    async fn send_message(&self, target: &str, text: &str, options: &SendOptions) -> Result<()> {
        self.posts.lock().unwrap().push(HomePost {
            target: target.to_string(),
            text: text.to_string(),
            options: options.clone(),
        });
        Ok(())
    }

    async fn lookup_user(&self, user_id: &str) -> Result<Identity> {
        self.users
            .get(user_id)
            .map(|name| Identity::new(user_id, name.clone()))
            .ok_or_else(|| NetworkError::NotFound(user_id.to_string()))
    }

    async fn lookup_channel(&self, channel_id: &str) -> Result<ChannelInfo> {
        self.channels
            .get(channel_id)
            .map(|name| ChannelInfo {
                id: channel_id.to_string(),
                name: name.clone(),
                members: Vec::new(),
            })
            .ok_or_else(|| NetworkError::NotFound(channel_id.to_string()))
    }

    async fn open_direct_message(&self, user_id: &str) -> Result<String> {
        Ok(dm_channel(user_id))
    }
}

// ---------------------------------------------------------------------------
// Network B
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub kind: MessageKind,
    pub target: String,
    pub text: String,
}

pub struct FakeLink {
    nick: String,
    topic: Option<String>,
    online: HashSet<String>,
    pub lines: Mutex<Vec<Line>>,
    pub quits: Mutex<Vec<String>>,
    pub joins: Mutex<Vec<String>>,
    pub names_requests: Mutex<Vec<String>>,
    /// Sends still allowed to succeed, then the error every later send returns.
    failure: Mutex<Option<(usize, NetworkError)>>,
}

impl FakeLink {
    fn push(&self, kind: MessageKind, target: &str, text: &str) -> Result<()> {
        let mut failure = self.failure.lock().unwrap();
        match failure.as_mut() {
            Some((0, error)) => return Err(error.clone()),
            Some((ok_left, _)) => *ok_left -= 1,
            None => {}
        }
        self.lines.lock().unwrap().push(Line {
            kind,
            target: target.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    /// Let `after` more sends through, then fail every send with `error`.
    pub fn fail_sends(&self, error: NetworkError, after: usize) {
        *self.failure.lock().unwrap() = Some((after, error));
    }

    pub fn heal(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn texts(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|l| l.text.clone())
            .collect()
    }

    pub fn lines(&self) -> Vec<Line> {
        self.lines.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShadowLink for FakeLink {
    fn nick(&self) -> &str {
        &self.nick
    }

    async fn send(&self, target: &str, text: &str) -> Result<()> {
        self.push(MessageKind::Normal, target, text)
    }

    async fn send_action(&self, target: &str, text: &str) -> Result<()> {
        self.push(MessageKind::Action, target, text)
    }

    async fn send_notice(&self, target: &str, text: &str) -> Result<()> {
        self.push(MessageKind::Notice, target, text)
    }

    async fn join(&self, channel: &str) -> Result<()> {
        self.joins.lock().unwrap().push(channel.to_string());
        Ok(())
    }

    async fn disconnect(&self, reason: &str) -> Result<()> {
        self.quits.lock().unwrap().push(reason.to_string());
        Ok(())
    }

    async fn whois(&self, nick: &str) -> Result<Option<PresenceInfo>> {
        Ok(self.online.contains(&nick.to_lowercase()).then(|| PresenceInfo {
            nick: nick.to_string(),
            away: false,
            channels: Vec::new(),
        }))
    }

    async fn request_names(&self, channel: &str) -> Result<()> {
        self.names_requests.lock().unwrap().push(channel.to_string());
        Ok(())
    }

    async fn topic(&self, _channel: &str) -> Result<Option<String>> {
        Ok(self.topic.clone())
    }
}

/// Shadow connects wait on `gate`; the listener (bot nick) connects at once.
pub struct FakeNetwork {
    gate: Semaphore,
    topic: Option<String>,
    online: HashSet<String>,
    rejected: HashSet<String>,
    /// Shadow links created while set refuse every send with this error.
    link_failure: Mutex<Option<NetworkError>>,
    pub requests: Mutex<Vec<ConnectRequest>>,
    links: Mutex<HashMap<String, Arc<FakeLink>>>,
    sinks: Mutex<HashMap<String, ShadowEventSink>>,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Self::build(Some("Welcome to the bridge".to_string()), &[], &[])
    }

    pub fn build(topic: Option<String>, online: &[&str], rejected: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            topic,
            online: online.iter().map(|n| n.to_lowercase()).collect(),
            rejected: rejected.iter().map(|n| n.to_string()).collect(),
            link_failure: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            links: Mutex::new(HashMap::new()),
            sinks: Mutex::new(HashMap::new()),
        })
    }

    /// Let `n` pending shadow handshakes complete.
    pub fn open(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn fail_new_links(&self, error: Option<NetworkError>) {
        *self.link_failure.lock().unwrap() = error;
    }

    pub fn link(&self, nick: &str) -> Option<Arc<FakeLink>> {
        self.links.lock().unwrap().get(nick).cloned()
    }

    pub fn connects_for(&self, nick: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.nick == nick)
            .count()
    }

    /// The event sink handed to the connection registered as `nick`.
    pub fn sink(&self, nick: &str) -> Option<ShadowEventSink> {
        self.sinks.lock().unwrap().get(nick).cloned()
    }
}

#[async_trait]
impl ShadowConnector for FakeNetwork {
    async fn connect(
        &self,
        request: ConnectRequest,
        events: ShadowEventSink,
    ) -> Result<Arc<dyn ShadowLink>> {
        self.requests.lock().unwrap().push(request.clone());

        if request.nick != BOT_NICK {
            self.gate
                .acquire()
                .await
                .map_err(|_| NetworkError::Closed)?
                .forget();
        }
        if self.rejected.contains(&request.nick) {
            return Err(NetworkError::NicknameInUse(request.nick));
        }

        let link = Arc::new(FakeLink {
            nick: request.nick.clone(),
            topic: self.topic.clone(),
            online: self.online.clone(),
            lines: Mutex::new(Vec::new()),
            quits: Mutex::new(Vec::new()),
            joins: Mutex::new(Vec::new()),
            names_requests: Mutex::new(Vec::new()),
            failure: Mutex::new(if request.nick == BOT_NICK {
                None
            } else {
                self.link_failure.lock().unwrap().clone().map(|e| (0, e))
            }),
        });
        self.links
            .lock()
            .unwrap()
            .insert(request.nick.clone(), link.clone());
        self.sinks.lock().unwrap().insert(request.nick, events);
        Ok(link)
    }
}

// ---------------------------------------------------------------------------
// Engine helpers
// ---------------------------------------------------------------------------

pub fn engine(home: &Arc<FakeHome>, net: &Arc<FakeNetwork>) -> RelayEngine {
    RelayEngine::new(&config(), home.clone(), net.clone()).unwrap()
}

/// Process events until nothing arrives for a short while.
pub async fn settle(engine: &mut RelayEngine) {
    while let Ok(true) = tokio::time::timeout(Duration::from_millis(50), engine.step()).await {}
}

/// Engine with its listener connection up.
pub async fn started(home: &Arc<FakeHome>, net: &Arc<FakeNetwork>) -> RelayEngine {
    let mut engine = engine(home, net);
    engine.start();
    settle(&mut engine).await;
    assert!(engine.listener_ready());
    engine
}

pub fn say(user_id: &str, channel_id: &str, text: &str) -> RelayEvent {
    RelayEvent::Home(HomeEvent::Message {
        user_id: user_id.to_string(),
        channel_id: channel_id.to_string(),
        text: text.to_string(),
        kind: MessageKind::Normal,
        attachments: Vec::new(),
        from_bot: false,
    })
}

pub fn owner(id: &str) -> OwnerId {
    OwnerId::from(id)
}
