//! Who is in which network-B channel, as seen by the listener connection.

use std::collections::{BTreeMap, HashMap};

/// Channel membership kept current from names/join/part/quit/kick/nick events.
///
/// Channel and nick keys are lowercased; the nick as last seen is kept for display.
#[derive(Debug, Default)]
pub struct Membership {
    channels: HashMap<String, BTreeMap<String, String>>,
}

/// Names replies prefix nicks with their channel mode (`@op`, `+voice`).
fn strip_mode(nick: &str) -> &str {
    nick.trim_start_matches(['@', '+', '%', '&', '~'])
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a channel's member list with a names reply.
    pub fn set_names(&mut self, channel: &str, nicks: &[String]) {
        let members = nicks
            .iter()
            .map(|n| strip_mode(n))
            .filter(|n| !n.is_empty())
            .map(|n| (n.to_lowercase(), n.to_string()))
            .collect();
        self.channels.insert(channel.to_lowercase(), members);
    }

    pub fn join(&mut self, channel: &str, nick: &str) {
        self.channels
            .entry(channel.to_lowercase())
            .or_default()
            .insert(nick.to_lowercase(), nick.to_string());
    }

    /// Also used for kicks.
    pub fn part(&mut self, channel: &str, nick: &str) -> bool {
        self.channels
            .get_mut(&channel.to_lowercase())
            .is_some_and(|m| m.remove(&nick.to_lowercase()).is_some())
    }

    /// Remove `nick` everywhere; returns the channels it was in.
    pub fn quit(&mut self, nick: &str) -> Vec<String> {
        let key = nick.to_lowercase();
        let mut left: Vec<String> = self
            .channels
            .iter_mut()
            .filter_map(|(channel, members)| members.remove(&key).map(|_| channel.clone()))
            .collect();
        left.sort();
        left
    }

    /// Rename `old` to `new` everywhere; returns the channels affected.
    pub fn rename(&mut self, old: &str, new: &str) -> Vec<String> {
        let key = old.to_lowercase();
        let mut affected = Vec::new();
        for (channel, members) in self.channels.iter_mut() {
            if members.remove(&key).is_some() {
                members.insert(new.to_lowercase(), new.to_string());
                affected.push(channel.clone());
            }
        }
        affected.sort();
        affected
    }

    pub fn contains(&self, channel: &str, nick: &str) -> bool {
        self.channels
            .get(&channel.to_lowercase())
            .is_some_and(|m| m.contains_key(&nick.to_lowercase()))
    }

    /// Is `nick` in any tracked channel?
    pub fn is_online(&self, nick: &str) -> bool {
        let key = nick.to_lowercase();
        self.channels.values().any(|m| m.contains_key(&key))
    }

    /// Members of `channel`, sorted case-insensitively.
    pub fn nicks(&self, channel: &str) -> Vec<String> {
        self.channels
            .get(&channel.to_lowercase())
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }
}
