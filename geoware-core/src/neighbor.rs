//! Neighbor table: one-hop neighbors learned from beacons and overheard packets.

use tracing::debug;

use crate::config::Config;
use crate::geo::{Address, Position};
use crate::pool::Pool;

#[derive(Debug, Clone, PartialEq)]
pub struct NeighborEntry {
    pub address: Address,
    pub position: Position,
    /// Neighbors of this neighbor, as advertised in its last beacon.
    pub second_hop: Vec<Position>,
    pub last_heard_ms: u64,
    pub expires_at_ms: u64,
}

#[derive(Debug, Clone)]
pub struct NeighborTable {
    entries: Pool<NeighborEntry>,
    max_second_hop: usize,
    timeout_ms: u64,
    bootstrap_ms: u64,
}

impl NeighborTable {
    pub fn new(config: &Config) -> Self {
        Self {
            entries: Pool::with_capacity(config.max_neighbors),
            max_second_hop: config.second_hop_limit(),
            timeout_ms: config.neighbor_timeout_ms,
            bootstrap_ms: config.bootstrap_ms,
        }
    }

    /// Timeout applied on refresh: doubled once the bootstrap window has passed.
    fn timeout_at(&self, now_ms: u64) -> u64 {
        if now_ms < self.bootstrap_ms {
            self.timeout_ms
        } else {
            self.timeout_ms.saturating_mul(2)
        }
    }

    /// Record a beacon. Returns false if the neighbor is new and the table is full.
    pub fn on_beacon(
        &mut self,
        from: Address,
        position: Position,
        second_hop: &[Position],
        now_ms: u64,
    ) -> bool {
        let limit = self.max_second_hop.min(second_hop.len());
        let second_hop = second_hop[..limit].to_vec();
        self.upsert(from, position, Some(second_hop), now_ms)
    }

    /// Record an overheard packet. Updates position and expiry; second-hop list is kept.
    pub fn on_packet_hint(&mut self, from: Address, position: Position, now_ms: u64) -> bool {
        self.upsert(from, position, None, now_ms)
    }

    fn upsert(
        &mut self,
        from: Address,
        position: Position,
        second_hop: Option<Vec<Position>>,
        now_ms: u64,
    ) -> bool {
        let expires_at_ms = now_ms.saturating_add(self.timeout_at(now_ms));
        if let Some(entry) = self
            .entries
            .find(|e| e.address == from)
            .and_then(|id| self.entries.get_mut(id))
        {
            entry.position = position;
            entry.last_heard_ms = now_ms;
            entry.expires_at_ms = expires_at_ms;
            if let Some(hops) = second_hop {
                entry.second_hop = hops;
            }
            return true;
        }
        let entry = NeighborEntry {
            address: from,
            position,
            second_hop: second_hop.unwrap_or_default(),
            last_heard_ms: now_ms,
            expires_at_ms,
        };
        match self.entries.insert(entry) {
            Ok(_) => {
                debug!(neighbor = %from, %position, "neighbor added");
                true
            }
            Err(e) => {
                debug!(neighbor = %from, "neighbor not tracked: {}", e);
                false
            }
        }
    }

    /// Drop every neighbor whose expiry has passed. Returns the removed addresses.
    pub fn expire(&mut self, now_ms: u64) -> Vec<Address> {
        let removed: Vec<Address> = self
            .entries
            .drain_where(|e| now_ms >= e.expires_at_ms)
            .into_iter()
            .map(|e| e.address)
            .collect();
        for addr in &removed {
            debug!(neighbor = %addr, "neighbor expired");
        }
        removed
    }

    pub fn get(&self, address: Address) -> Option<&NeighborEntry> {
        self.entries
            .find(|e| e.address == address)
            .and_then(|id| self.entries.get(id))
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Positions advertised in our own beacon: the first K neighbors.
    pub fn beacon_positions(&self) -> Vec<Position> {
        self.entries
            .iter()
            .take(self.max_second_hop)
            .map(|e| e.position)
            .collect()
    }
}
