//! Subscription registry: active subscriptions (owned or in-region) and seen records
//! kept by forwarders for duplicate suppression.

use crate::config::Config;
use crate::pool::{Pool, PoolFull};
use crate::protocol::{Sid, Subscription};

/// Periodic sampling state of an in-region, non-owner subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampler {
    pub next_due_ms: u64,
    /// Samples taken since the last publish.
    pub collected: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSubscription {
    pub subscription: Subscription,
    /// `None` on the owner, or after the sampler was disarmed.
    pub sampler: Option<Sampler>,
}

/// Per-sid state. A sid is never both active and seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unknown,
    Active,
    Seen,
}

#[derive(Debug, Clone)]
pub struct SubscriptionRegistry {
    active: Pool<ActiveSubscription>,
    seen: Pool<Sid>,
}

impl SubscriptionRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            active: Pool::with_capacity(config.max_subscriptions),
            seen: Pool::with_capacity(config.max_subscriptions),
        }
    }

    pub fn state(&self, sid: Sid) -> SubscriptionState {
        if self.is_subscribed(sid) {
            SubscriptionState::Active
        } else if self.was_seen(sid) {
            SubscriptionState::Seen
        } else {
            SubscriptionState::Unknown
        }
    }

    pub fn is_subscribed(&self, sid: Sid) -> bool {
        self.active.find(|a| a.subscription.sid == sid).is_some()
    }

    pub fn was_seen(&self, sid: Sid) -> bool {
        self.seen.find(|s| *s == sid).is_some()
    }

    /// Add an active subscription. A seen record for the same sid is dropped.
    pub fn add_subscription(
        &mut self,
        subscription: Subscription,
        sampler: Option<Sampler>,
    ) -> Result<(), PoolFull> {
        let sid = subscription.sid;
        self.active.insert(ActiveSubscription {
            subscription,
            sampler,
        })?;
        self.seen.remove_first(|s| *s == sid);
        Ok(())
    }

    /// Remove an active subscription; its sampler goes with it.
    pub fn remove_subscription(&mut self, sid: Sid) -> Option<Subscription> {
        self.active
            .remove_first(|a| a.subscription.sid == sid)
            .map(|a| a.subscription)
    }

    /// Record a sid as seen. No-op if it is already known in either pool.
    pub fn add_seen(&mut self, sid: Sid) -> Result<(), PoolFull> {
        if self.state(sid) != SubscriptionState::Unknown {
            return Ok(());
        }
        self.seen.insert(sid).map(|_| ())
    }

    pub fn remove_seen(&mut self, sid: Sid) -> bool {
        self.seen.remove_first(|s| *s == sid).is_some()
    }

    pub fn get(&self, sid: Sid) -> Option<&ActiveSubscription> {
        self.active
            .find(|a| a.subscription.sid == sid)
            .and_then(|id| self.active.get(id))
    }

    pub fn get_mut(&mut self, sid: Sid) -> Option<&mut ActiveSubscription> {
        let id = self.active.find(|a| a.subscription.sid == sid)?;
        self.active.get_mut(id)
    }

    /// Active subscriptions in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ActiveSubscription> + '_ {
        self.active.iter()
    }

    pub fn seen(&self) -> impl Iterator<Item = &Sid> + '_ {
        self.seen.iter()
    }

    pub fn is_full(&self) -> bool {
        self.active.is_full()
    }

    /// Sids whose sampler is due at `now_ms`.
    pub fn due_samplers(&self, now_ms: u64) -> Vec<Sid> {
        self.active
            .iter()
            .filter(|a| a.sampler.is_some_and(|s| s.next_due_ms <= now_ms))
            .map(|a| a.subscription.sid)
            .collect()
    }
}
