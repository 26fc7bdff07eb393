//! Static network-A ↔ network-B channel correspondence.

use std::collections::{BTreeMap, HashMap};

use tandem_core::CoreError;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChannelPair {
    a: String,
    b: String,
}

/// Immutable after construction; safe to share read-only.
///
/// Network-A names are matched without a leading `#` and case-insensitively,
/// so `#general`, `general` and `General` are the same channel. Network-B names
/// are case-normalized.
#[derive(Debug, Clone, Default)]
pub struct ChannelMap {
    pairs: Vec<ChannelPair>,
    by_a: HashMap<String, usize>,
    by_b: HashMap<String, usize>,
}

fn normalize_a(name: &str) -> String {
    name.trim().trim_start_matches('#').to_lowercase()
}

fn normalize_b(name: &str) -> String {
    name.trim().to_lowercase()
}

impl ChannelMap {
    /// Build from `A name → B name` pairs. Duplicates on either side are rejected.
    pub fn from_pairs(channels: &BTreeMap<String, String>) -> Result<Self> {
        let mut map = ChannelMap::default();
        for (a, b) in channels {
            let (key_a, key_b) = (normalize_a(a), normalize_b(b));
            if map.by_a.contains_key(&key_a) {
                return Err(CoreError::ChannelMapping {
                    channel: a.clone(),
                    reason: "network-A channel is mapped twice".into(),
                }
                .into());
            }
            if map.by_b.contains_key(&key_b) {
                return Err(CoreError::ChannelMapping {
                    channel: a.clone(),
                    reason: format!("network-B channel {:?} is mapped twice", b),
                }
                .into());
            }
            let idx = map.pairs.len();
            map.pairs.push(ChannelPair {
                a: a.clone(),
                b: b.clone(),
            });
            map.by_a.insert(key_a, idx);
            map.by_b.insert(key_b, idx);
        }
        Ok(map)
    }

    /// Network-B channel for a network-A channel name.
    pub fn to_b(&self, a_channel: &str) -> Option<&str> {
        self.by_a
            .get(&normalize_a(a_channel))
            .map(|&i| self.pairs[i].b.as_str())
    }

    /// Network-A channel (as configured) for a network-B channel name.
    pub fn to_a(&self, b_channel: &str) -> Option<&str> {
        self.by_b
            .get(&normalize_b(b_channel))
            .map(|&i| self.pairs[i].a.as_str())
    }

    pub fn b_channels(&self) -> Vec<String> {
        self.pairs.iter().map(|p| p.b.clone()).collect()
    }

    /// `(A, B)` pairs in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|p| (p.a.as_str(), p.b.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
