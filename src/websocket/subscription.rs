//! Channel subscription bookkeeping.
//!
//! [`SubscriptionManager`] decides which subscribe/unsubscribe commands to
//! send for a [`ChannelTarget`]. It never talks to the socket itself: every
//! operation returns the commands, in order, for the caller to write.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::models::{Channel, ChannelSubscription, ChannelTarget, OutboundCommand};

/// Tracks the subscription set of one connection.
#[derive(Debug)]
pub struct SubscriptionManager {
    target: Option<ChannelTarget>,
    ready: bool,
    /// Channels required by the current target.
    wanted: BTreeMap<Channel, ChannelSubscription>,
    /// Sent but not yet confirmed, with the instant of the last send.
    pending: BTreeMap<Channel, Instant>,
    confirmed: BTreeSet<Channel>,
    confirm_timeout: Duration,
}

impl SubscriptionManager {
    #[must_use]
    pub fn new(confirm_timeout: Duration) -> Self {
        Self {
            target: None,
            ready: false,
            wanted: BTreeMap::new(),
            pending: BTreeMap::new(),
            confirmed: BTreeSet::new(),
            confirm_timeout,
        }
    }

    pub fn target(&self) -> Option<&ChannelTarget> {
        self.target.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Returns `true` if a subscribe for `channel` was sent on this connection.
    pub fn is_subscribed(&self, channel: Channel) -> bool {
        self.confirmed.contains(&channel) || self.pending.contains_key(&channel)
    }

    pub fn is_confirmed(&self, channel: Channel) -> bool {
        self.confirmed.contains(&channel)
    }

    pub fn confirmed(&self) -> impl Iterator<Item = Channel> + '_ {
        self.confirmed.iter().copied()
    }

    pub fn pending(&self) -> impl Iterator<Item = Channel> + '_ {
        self.pending.keys().copied()
    }

    /// Switches to `target`.
    ///
    /// Returns `None` when the target is unchanged. Otherwise every channel
    /// of the previous target is unsubscribed before the new target's
    /// channels are subscribed. While the transport is not ready only the
    /// target is recorded and the returned list is empty.
    pub fn retarget(
        &mut self,
        target: ChannelTarget,
        now: Instant,
    ) -> Option<Vec<OutboundCommand>> {
        if self.target.as_ref() == Some(&target) {
            debug!(coin_id = %target.coin_id, "Target unchanged");
            return None;
        }

        info!(
            coin_id = %target.coin_id,
            pool_id = %target.pool_id,
            interval = %target.live_interval,
            "Switching subscription target"
        );

        let mut commands = self.unsubscribe_all();
        self.wanted = target
            .subscriptions()
            .into_iter()
            .map(|sub| (sub.channel(), sub))
            .collect();
        self.target = Some(target);

        if self.ready {
            commands.extend(self.subscribe_wanted(now));
        }

        Some(commands)
    }

    /// Records a transport readiness flip.
    ///
    /// Going ready subscribes the current target from scratch. Going
    /// not-ready invalidates the subscription set, since the server forgets
    /// it with the connection.
    pub fn set_ready(&mut self, ready: bool, now: Instant) -> Vec<OutboundCommand> {
        self.ready = ready;
        self.pending.clear();
        self.confirmed.clear();

        if ready {
            self.subscribe_wanted(now)
        } else {
            Vec::new()
        }
    }

    /// Records a confirmation frame for `channel`.
    ///
    /// Returns the confirmed channel, or `None` if it is unknown or was not
    /// requested on this connection.
    pub fn confirm(&mut self, channel: &str) -> Option<Channel> {
        let Some(parsed) = Channel::from_wire(channel) else {
            debug!(channel, "Confirmation for unknown channel");
            return None;
        };

        if self.pending.remove(&parsed).is_none() && !self.confirmed.contains(&parsed) {
            debug!(channel, "Confirmation for channel that was not requested");
            return None;
        }

        self.confirmed.insert(parsed);
        info!(channel, "Subscription confirmed");
        Some(parsed)
    }

    /// Resends subscriptions still unconfirmed after the confirm timeout.
    pub fn resend_unconfirmed(&mut self, now: Instant) -> Vec<OutboundCommand> {
        if !self.ready {
            return Vec::new();
        }

        let stale: Vec<Channel> = self
            .pending
            .iter()
            .filter(|(_, sent)| now.saturating_duration_since(**sent) >= self.confirm_timeout)
            .map(|(channel, _)| *channel)
            .collect();

        let mut commands = Vec::new();
        for channel in stale {
            let Some(sub) = self.wanted.get(&channel) else {
                self.pending.remove(&channel);
                continue;
            };
            warn!(
                channel = channel.as_str(),
                "Subscription unconfirmed, resending"
            );
            commands.extend(subscribe_commands(sub));
            self.pending.insert(channel, now);
        }

        commands
    }

    fn unsubscribe_all(&mut self) -> Vec<OutboundCommand> {
        let sent: BTreeSet<Channel> = self
            .confirmed
            .iter()
            .copied()
            .chain(self.pending.keys().copied())
            .collect();
        self.confirmed.clear();
        self.pending.clear();

        sent.into_iter()
            .map(|channel| {
                info!(channel = channel.as_str(), "Unsubscribing from channel");
                OutboundCommand::Unsubscribe(channel)
            })
            .collect()
    }

    fn subscribe_wanted(&mut self, now: Instant) -> Vec<OutboundCommand> {
        let mut commands = Vec::new();
        for (channel, sub) in &self.wanted {
            if self.confirmed.contains(channel) || self.pending.contains_key(channel) {
                continue;
            }
            info!(channel = channel.as_str(), "Subscribing to channel");
            commands.extend(subscribe_commands(sub));
            self.pending.insert(*channel, now);
        }
        commands
    }
}

fn subscribe_commands(sub: &ChannelSubscription) -> [OutboundCommand; 2] {
    let channel = sub.channel();
    [
        OutboundCommand::Subscribe(channel),
        OutboundCommand::Message {
            channel,
            data: sub.payload(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LiveInterval;

    fn manager() -> SubscriptionManager {
        let mut subs = SubscriptionManager::new(Duration::from_secs(10));
        subs.set_ready(true, Instant::now());
        subs
    }

    #[test]
    fn not_ready_only_records_target() {
        let mut subs = SubscriptionManager::new(Duration::from_secs(10));
        let now = Instant::now();
        let commands = subs
            .retarget(ChannelTarget::new("bitcoin", "", LiveInterval::OneMinute), now)
            .unwrap();
        assert!(commands.is_empty());

        let commands = subs.set_ready(true, now);
        assert_eq!(
            commands[0],
            OutboundCommand::Subscribe(Channel::Price)
        );
        assert_eq!(commands.len(), 2);
    }

    #[test]
    fn resends_only_stale_pending() {
        let mut subs = manager();
        let start = Instant::now();
        subs.retarget(ChannelTarget::new("bitcoin", "", LiveInterval::OneMinute), start);

        assert!(subs.resend_unconfirmed(start + Duration::from_secs(5)).is_empty());

        let resent = subs.resend_unconfirmed(start + Duration::from_secs(11));
        assert_eq!(resent.len(), 2);
        assert_eq!(resent[0], OutboundCommand::Subscribe(Channel::Price));

        subs.confirm("CGSimplePrice");
        assert!(subs.resend_unconfirmed(start + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn disconnect_invalidates_set() {
        let mut subs = manager();
        let now = Instant::now();
        subs.retarget(ChannelTarget::new("bitcoin", "", LiveInterval::OneMinute), now);
        subs.confirm("CGSimplePrice");
        assert!(subs.is_confirmed(Channel::Price));

        assert!(subs.set_ready(false, now).is_empty());
        assert!(!subs.is_subscribed(Channel::Price));

        let commands = subs.set_ready(true, now);
        assert_eq!(commands[0], OutboundCommand::Subscribe(Channel::Price));
    }

    #[test]
    fn ignores_unrequested_confirmation() {
        let mut subs = manager();
        assert_eq!(subs.confirm("OnchainTrade"), None);
        assert_eq!(subs.confirm("SomethingNew"), None);
    }
}
