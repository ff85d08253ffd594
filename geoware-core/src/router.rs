//! Next-hop selection for geographically addressed packets.
//!
//! Order: proximity short-circuit, greedy, second-hop, random. Pure over the
//! neighbor table; the only side effect is the RNG draw in the random fallback.

use rand::seq::IteratorRandom;
use rand::Rng;

use crate::geo::{distance, Address, Position};
use crate::neighbor::NeighborTable;

/// One relay decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteRequest {
    pub destination: Position,
    /// A neighbor closer than this to the destination becomes the final receiver.
    pub proximity: f32,
    /// Current final receiver of the packet (`Address::UNRESOLVED` until resolved).
    pub receiver: Address,
    pub previous_hop: Address,
    pub hops: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopKind {
    /// Neighbor within the proximity radius; becomes the final receiver.
    Final,
    Greedy,
    SecondHop,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    pub address: Address,
    pub kind: HopKind,
}

pub fn select_next_hop<R: Rng + ?Sized>(
    own_address: Address,
    own_position: Position,
    request: &RouteRequest,
    neighbors: &NeighborTable,
    rng: &mut R,
) -> Option<Hop> {
    if neighbors.is_empty() || request.receiver == own_address {
        return None;
    }
    let dest = &request.destination;

    if let Some(n) = neighbors
        .iter()
        .find(|n| distance(&n.position, dest) < request.proximity)
    {
        return Some(Hop {
            address: n.address,
            kind: HopKind::Final,
        });
    }

    let own_distance = distance(&own_position, dest);

    // On the first hop the previous hop is the originator; it may still be the best relay.
    let mut best = own_distance;
    let mut greedy = None;
    for n in neighbors.iter() {
        if n.address == request.previous_hop && request.hops != 1 {
            continue;
        }
        let d = distance(&n.position, dest);
        if d < best {
            best = d;
            greedy = Some(n.address);
        }
    }
    if let Some(address) = greedy {
        return Some(Hop {
            address,
            kind: HopKind::Greedy,
        });
    }

    let mut best = own_distance;
    let mut via = None;
    for n in neighbors.iter().filter(|n| n.address != request.previous_hop) {
        for p in n.second_hop.iter().filter(|p| **p != own_position) {
            let d = distance(p, dest);
            if d < best {
                best = d;
                via = Some(n.address);
            }
        }
    }
    if let Some(address) = via {
        return Some(Hop {
            address,
            kind: HopKind::SecondHop,
        });
    }

    neighbors
        .iter()
        .filter(|n| n.address != request.previous_hop)
        .choose(rng)
        .map(|n| Hop {
            address: n.address,
            kind: HopKind::Random,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const ME: Address = Address::new(1, 0);
    const ORIGIN: Position = Position::new(0.0, 0.0);
    const FAR_EAST: Position = Position::new(100.0, 0.0);

    fn request(
        destination: Position,
        proximity: f32,
        previous_hop: Address,
        hops: u8,
    ) -> RouteRequest {
        RouteRequest {
            destination,
            proximity,
            receiver: Address::UNRESOLVED,
            previous_hop,
            hops,
        }
    }

    fn neighbors(entries: Vec<(u8, Position, Vec<Position>)>) -> NeighborTable {
        let mut t = NeighborTable::new(&Config::default());
        for (id, pos, hops) in entries {
            t.on_beacon(Address::new(id, 0), pos, &hops, 0);
        }
        t
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn proximity_short_circuit_wins() {
        let t = neighbors(vec![
            (2, Position::new(10.0, 0.0), vec![]),
            (3, Position::new(20.0, 0.0), vec![]),
        ]);
        let req = request(Position::new(21.0, 0.0), 2.0, Address::new(9, 0), 3);
        let hop = select_next_hop(ME, ORIGIN, &req, &t, &mut rng()).unwrap();
        assert_eq!(
            hop,
            Hop {
                address: Address::new(3, 0),
                kind: HopKind::Final
            }
        );
    }

    #[test]
    fn proximity_checked_in_table_order() {
        // Both are in range; the first one listed wins even though the second is closer.
        let t = neighbors(vec![
            (2, Position::new(19.0, 0.0), vec![]),
            (3, Position::new(20.5, 0.0), vec![]),
        ]);
        let req = request(Position::new(21.0, 0.0), 5.0, Address::new(9, 0), 3);
        let hop = select_next_hop(ME, ORIGIN, &req, &t, &mut rng()).unwrap();
        assert_eq!(hop.address, Address::new(2, 0));
        assert_eq!(hop.kind, HopKind::Final);
    }

    #[test]
    fn greedy_picks_closest_strictly_better() {
        let t = neighbors(vec![
            (2, Position::new(5.0, 0.0), vec![]),
            (3, Position::new(8.0, 0.0), vec![]),
            (4, Position::new(-5.0, 0.0), vec![]),
        ]);
        let req = request(FAR_EAST, 0.05, Address::new(9, 0), 3);
        let hop = select_next_hop(ME, ORIGIN, &req, &t, &mut rng()).unwrap();
        assert_eq!(
            hop,
            Hop {
                address: Address::new(3, 0),
                kind: HopKind::Greedy
            }
        );
    }

    #[test]
    fn greedy_skips_previous_hop_after_first_hop() {
        let t = neighbors(vec![
            (2, Position::new(8.0, 0.0), vec![]),
            (3, Position::new(5.0, 0.0), vec![]),
        ]);
        let prev = Address::new(2, 0);
        let hop = select_next_hop(ME, ORIGIN, &request(FAR_EAST, 0.05, prev, 2), &t, &mut rng());
        assert_eq!(hop.unwrap().address, Address::new(3, 0));
        // First hop: the previous hop is eligible.
        let hop = select_next_hop(ME, ORIGIN, &request(FAR_EAST, 0.05, prev, 1), &t, &mut rng());
        assert_eq!(hop.unwrap().address, prev);
    }

    #[test]
    fn second_hop_fallback() {
        // No neighbor is closer than us, but B knows a node that is.
        let t = neighbors(vec![
            (
                2,
                Position::new(0.0, 10.0),
                vec![Position::new(50.0, 10.0), ORIGIN],
            ),
            (3, Position::new(-10.0, 0.0), vec![]),
        ]);
        let req = request(FAR_EAST, 0.05, Address::new(9, 0), 3);
        let hop = select_next_hop(ME, ORIGIN, &req, &t, &mut rng()).unwrap();
        assert_eq!(
            hop,
            Hop {
                address: Address::new(2, 0),
                kind: HopKind::SecondHop
            }
        );
    }

    #[test]
    fn second_hop_skips_previous_hop_entirely() {
        let t = neighbors(vec![(
            2,
            Position::new(0.0, 10.0),
            vec![Position::new(90.0, 0.0)],
        )]);
        // Only neighbor is the previous hop: no second hop, no random choice.
        let req = request(FAR_EAST, 0.05, Address::new(2, 0), 3);
        assert_eq!(select_next_hop(ME, ORIGIN, &req, &t, &mut rng()), None);
    }

    #[test]
    fn random_fallback_avoids_previous_hop() {
        let t = neighbors(vec![
            (2, Position::new(-10.0, 0.0), vec![]),
            (3, Position::new(-10.0, 5.0), vec![]),
        ]);
        let req = request(FAR_EAST, 0.05, Address::new(2, 0), 3);
        let mut r = rng();
        for _ in 0..20 {
            let hop = select_next_hop(ME, ORIGIN, &req, &t, &mut r).unwrap();
            assert_eq!(
                hop,
                Hop {
                    address: Address::new(3, 0),
                    kind: HopKind::Random
                }
            );
        }
    }

    #[test]
    fn empty_table_or_addressed_to_self() {
        let t = neighbors(vec![]);
        let req = request(Position::new(1.0, 0.0), 0.05, Address::new(9, 0), 1);
        assert_eq!(select_next_hop(ME, ORIGIN, &req, &t, &mut rng()), None);

        let t = neighbors(vec![(2, Position::new(1.0, 0.0), vec![])]);
        let req = RouteRequest { receiver: ME, ..req };
        assert_eq!(select_next_hop(ME, ORIGIN, &req, &t, &mut rng()), None);
    }
}
