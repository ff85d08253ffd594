//! Subscribe/unsubscribe flooding: duplicate suppression, region activation and
//! the rebroadcast decision for every received subscription packet.

use tracing::{debug, info};

use crate::geo::{distance, Position};
use crate::neighbor::NeighborTable;
use crate::protocol::{SubscribePacket, UnsubscribePacket};
use crate::subscription::{Sampler, SubscriptionRegistry, SubscriptionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Already active or seen.
    Duplicate,
    /// Inside the region; `sampling` is false on the owner.
    Activated { sampling: bool },
    /// Inside the region but the registry is full.
    ActivationFailed,
    /// Outside the region, next to it: forwarded for the in-region nodes.
    Seen,
    OutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Cancelled,
    Forgotten,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision<O> {
    pub outcome: O,
    pub rebroadcast: bool,
}

/// Handle a subscribe packet received at `own_position`.
pub fn on_subscribe(
    registry: &mut SubscriptionRegistry,
    neighbors: &NeighborTable,
    own_position: Position,
    packet: &SubscribePacket,
    now_ms: u64,
) -> Decision<SubscribeOutcome> {
    let sub = &packet.subscription;
    if registry.state(sub.sid) != SubscriptionState::Unknown {
        return Decision {
            outcome: SubscribeOutcome::Duplicate,
            rebroadcast: false,
        };
    }

    if sub.contains(&own_position) {
        // Owner detection is by position; the owner never samples its own subscription.
        let sampler = (sub.owner_position != own_position).then(|| Sampler {
            next_due_ms: now_ms.saturating_add(u64::from(sub.period_ms)),
            collected: 0,
        });
        let sampling = sampler.is_some();
        return match registry.add_subscription(sub.clone(), sampler) {
            Ok(()) => {
                info!(sid = %sub.sid, sensor = %sub.sensor, period_ms = sub.period_ms, "subscription activated");
                Decision {
                    outcome: SubscribeOutcome::Activated { sampling },
                    rebroadcast: packet.firework,
                }
            }
            Err(e) => {
                debug!(sid = %sub.sid, "subscription not activated: {}", e);
                Decision {
                    outcome: SubscribeOutcome::ActivationFailed,
                    rebroadcast: false,
                }
            }
        };
    }

    let borders_region = neighbors
        .iter()
        .any(|n| distance(&n.position, &sub.center) <= sub.radius);
    if borders_region {
        if let Err(e) = registry.add_seen(sub.sid) {
            debug!(sid = %sub.sid, "seen record dropped: {}", e);
        }
        return Decision {
            outcome: SubscribeOutcome::Seen,
            rebroadcast: true,
        };
    }

    Decision {
        outcome: SubscribeOutcome::OutOfRange,
        rebroadcast: false,
    }
}

/// Handle an unsubscribe packet.
pub fn on_unsubscribe(
    registry: &mut SubscriptionRegistry,
    packet: &UnsubscribePacket,
) -> Decision<UnsubscribeOutcome> {
    let outcome = match registry.state(packet.sid) {
        SubscriptionState::Active => {
            registry.remove_subscription(packet.sid);
            info!(sid = %packet.sid, "subscription cancelled");
            UnsubscribeOutcome::Cancelled
        }
        SubscriptionState::Seen => {
            registry.remove_seen(packet.sid);
            UnsubscribeOutcome::Forgotten
        }
        SubscriptionState::Unknown => UnsubscribeOutcome::Unknown,
    };
    Decision {
        outcome,
        rebroadcast: outcome != UnsubscribeOutcome::Unknown && packet.firework,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::geo::Address;
    use crate::protocol::{Aggregation, SensorType, Sid, Subscription};

    const OWNER: Position = Position::new(0.0, 0.0);
    const CENTER: Position = Position::new(100.0, 0.0);

    fn packet(sid: u16, firework: bool) -> SubscribePacket {
        SubscribePacket {
            sender: OWNER,
            firework,
            subscription: Subscription {
                sid: Sid(sid),
                owner_address: Address::new(1, 0),
                owner_position: OWNER,
                sensor: SensorType(1),
                period_ms: 2000,
                aggregation: Aggregation::None,
                window: 0,
                center: CENTER,
                radius: 10.0,
            },
        }
    }

    fn unsub(sid: u16, firework: bool) -> UnsubscribePacket {
        UnsubscribePacket {
            sender: OWNER,
            firework,
            sid: Sid(sid),
            center: CENTER,
            radius: 10.0,
        }
    }

    fn setup() -> (SubscriptionRegistry, NeighborTable) {
        let c = Config::default();
        (SubscriptionRegistry::new(&c), NeighborTable::new(&c))
    }

    #[test]
    fn in_region_activates_and_arms_sampler() {
        let (mut reg, nt) = setup();
        let d = on_subscribe(&mut reg, &nt, Position::new(95.0, 0.0), &packet(1, true), 1000);
        assert_eq!(
            d,
            Decision {
                outcome: SubscribeOutcome::Activated { sampling: true },
                rebroadcast: true
            }
        );
        let s = reg.get(Sid(1)).unwrap().sampler.unwrap();
        assert_eq!(s.next_due_ms, 3000);
    }

    #[test]
    fn in_region_without_firework_does_not_rebroadcast() {
        let (mut reg, nt) = setup();
        let d = on_subscribe(&mut reg, &nt, Position::new(95.0, 0.0), &packet(1, false), 0);
        assert!(matches!(d.outcome, SubscribeOutcome::Activated { .. }));
        assert!(!d.rebroadcast);
    }

    #[test]
    fn duplicate_is_suppressed() {
        let (mut reg, nt) = setup();
        let me = Position::new(95.0, 0.0);
        on_subscribe(&mut reg, &nt, me, &packet(1, true), 0);
        let d = on_subscribe(&mut reg, &nt, me, &packet(1, true), 10);
        assert_eq!(d.outcome, SubscribeOutcome::Duplicate);
        assert!(!d.rebroadcast);
        assert_eq!(reg.iter().count(), 1);
    }

    #[test]
    fn owner_in_region_does_not_sample() {
        let (mut reg, nt) = setup();
        let mut p = packet(1, true);
        p.subscription.owner_position = Position::new(100.0, 5.0);
        let d = on_subscribe(&mut reg, &nt, Position::new(100.0, 5.0), &p, 0);
        assert_eq!(d.outcome, SubscribeOutcome::Activated { sampling: false });
        assert!(reg.get(Sid(1)).unwrap().sampler.is_none());
    }

    #[test]
    fn bordering_node_records_seen_and_forwards() {
        let (mut reg, mut nt) = setup();
        nt.on_beacon(Address::new(5, 0), Position::new(92.0, 0.0), &[], 0);
        let d = on_subscribe(&mut reg, &nt, Position::new(80.0, 0.0), &packet(1, false), 0);
        assert_eq!(
            d,
            Decision {
                outcome: SubscribeOutcome::Seen,
                rebroadcast: true
            }
        );
        assert!(reg.was_seen(Sid(1)));
        let d = on_subscribe(&mut reg, &nt, Position::new(80.0, 0.0), &packet(1, false), 5);
        assert_eq!(d.outcome, SubscribeOutcome::Duplicate);
    }

    #[test]
    fn far_node_drops() {
        let (mut reg, mut nt) = setup();
        nt.on_beacon(Address::new(5, 0), Position::new(50.0, 0.0), &[], 0);
        let d = on_subscribe(&mut reg, &nt, Position::new(40.0, 0.0), &packet(1, true), 0);
        assert_eq!(d.outcome, SubscribeOutcome::OutOfRange);
        assert!(!d.rebroadcast);
        assert_eq!(reg.state(Sid(1)), SubscriptionState::Unknown);
    }

    #[test]
    fn full_registry_blocks_activation() {
        let c = Config {
            max_subscriptions: 1,
            ..Config::default()
        };
        let mut reg = SubscriptionRegistry::new(&c);
        let nt = NeighborTable::new(&c);
        let me = Position::new(95.0, 0.0);
        on_subscribe(&mut reg, &nt, me, &packet(1, true), 0);
        let d = on_subscribe(&mut reg, &nt, me, &packet(2, true), 0);
        assert_eq!(d.outcome, SubscribeOutcome::ActivationFailed);
        assert!(!d.rebroadcast);
    }

    #[test]
    fn unsubscribe_paths() {
        let (mut reg, mut nt) = setup();
        on_subscribe(&mut reg, &nt, Position::new(95.0, 0.0), &packet(1, true), 0);
        nt.on_beacon(Address::new(5, 0), Position::new(92.0, 0.0), &[], 0);
        on_subscribe(&mut reg, &nt, Position::new(80.0, 0.0), &packet(2, true), 0);

        let d = on_unsubscribe(&mut reg, &unsub(1, true));
        assert_eq!(
            d,
            Decision {
                outcome: UnsubscribeOutcome::Cancelled,
                rebroadcast: true
            }
        );
        assert_eq!(reg.state(Sid(1)), SubscriptionState::Unknown);

        let d = on_unsubscribe(&mut reg, &unsub(2, false));
        assert_eq!(d.outcome, UnsubscribeOutcome::Forgotten);
        assert!(!d.rebroadcast);

        let d = on_unsubscribe(&mut reg, &unsub(3, true));
        assert_eq!(d.outcome, UnsubscribeOutcome::Unknown);
        assert!(!d.rebroadcast);
    }
}
