//! Per-owner, per-destination FIFO buffers for outbound network-B traffic.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;

use tracing::{debug, warn};

use tandem_core::{MessageEnvelope, OwnerId};

/// Deferred sends allowed per item unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// What the send callback did with one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered; remove it.
    Sent,
    /// Will never succeed (e.g. empty after formatting); remove it.
    Dropped,
    /// Could not send right now; keep it and stop this destination.
    /// Counts as one attempt against the queue's limit.
    Deferred,
    /// The connection went away; keep it and stop the whole drain.
    Halt,
}

#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    pub sent: usize,
    pub dropped: usize,
    /// Items still queued for the owner afterwards.
    pub remaining: usize,
    /// The drain stopped on [`SendOutcome::Halt`].
    pub halted: bool,
    /// Items removed after running out of attempts, with their destination.
    pub abandoned: Vec<(String, MessageEnvelope)>,
}

#[derive(Debug)]
struct Queued {
    envelope: MessageEnvelope,
    attempts: u32,
}

/// `owner → destination → FIFO`. Unbounded; sequences are created lazily.
#[derive(Debug)]
pub struct OutboundQueue {
    owners: HashMap<OwnerId, BTreeMap<String, VecDeque<Queued>>>,
    max_attempts: u32,
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::with_max_attempts(DEFAULT_MAX_ATTEMPTS)
    }

    /// Give up on an item after `max_attempts` deferred sends (at least one).
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            owners: HashMap::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Append to the tail of `(owner, destination)`.
    pub fn enqueue(&mut self, owner: &OwnerId, destination: &str, envelope: MessageEnvelope) {
        self.owners
            .entry(owner.clone())
            .or_default()
            .entry(destination.to_string())
            .or_default()
            .push_back(Queued {
                envelope,
                attempts: 0,
            });
    }

    /// Hand queued envelopes to `send` in FIFO order, one destination at a time.
    ///
    /// An envelope leaves the queue once `send` reports [`SendOutcome::Sent`]
    /// or [`SendOutcome::Dropped`], or once it has been deferred
    /// `max_attempts` times. A [`SendOutcome::Halt`] costs no attempt, so
    /// anything in flight when the connection failed is retried by the next
    /// drain.
    pub async fn drain<F, Fut>(&mut self, owner: &OwnerId, mut send: F) -> DrainReport
    where
        F: FnMut(String, MessageEnvelope) -> Fut,
        Fut: Future<Output = SendOutcome>,
    {
        let mut report = DrainReport::default();
        let max_attempts = self.max_attempts;
        let Some(destinations) = self.owners.get_mut(owner) else {
            return report;
        };

        'destinations: for (destination, items) in destinations.iter_mut() {
            while let Some(front) = items.front_mut() {
                match send(destination.clone(), front.envelope.clone()).await {
                    SendOutcome::Sent => {
                        items.pop_front();
                        report.sent += 1;
                    }
                    SendOutcome::Dropped => {
                        items.pop_front();
                        report.dropped += 1;
                    }
                    SendOutcome::Deferred => {
                        front.attempts += 1;
                        if front.attempts < max_attempts {
                            debug!(
                                owner = %owner,
                                destination = %destination,
                                attempts = front.attempts,
                                "drain deferred"
                            );
                            break;
                        }
                        if let Some(gone) = items.pop_front() {
                            warn!(
                                owner = %owner,
                                destination = %destination,
                                attempts = gone.attempts,
                                "giving up on queued message"
                            );
                            report.abandoned.push((destination.clone(), gone.envelope));
                        }
                    }
                    SendOutcome::Halt => {
                        debug!(owner = %owner, destination = %destination, "drain halted");
                        report.halted = true;
                        break 'destinations;
                    }
                }
            }
        }

        destinations.retain(|_, items| !items.is_empty());
        report.remaining = destinations.values().map(VecDeque::len).sum();
        if destinations.is_empty() {
            self.owners.remove(owner);
        }
        report
    }

    /// Total items queued for `owner`.
    pub fn pending(&self, owner: &OwnerId) -> usize {
        self.owners
            .get(owner)
            .map(|d| d.values().map(VecDeque::len).sum())
            .unwrap_or(0)
    }

    pub fn pending_for(&self, owner: &OwnerId, destination: &str) -> usize {
        self.owners
            .get(owner)
            .and_then(|d| d.get(destination))
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Forget the owner's entry once it is empty and its connection is closed.
    pub fn collect_garbage(&mut self, owner: &OwnerId, connection_closed: bool) -> bool {
        if !connection_closed || self.pending(owner) > 0 {
            return false;
        }
        self.owners.remove(owner).is_some()
    }

    pub fn owners(&self) -> impl Iterator<Item = &OwnerId> {
        self.owners.keys()
    }
}
