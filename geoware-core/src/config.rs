//! Node tunables. All fields default to the values used on the motes.

use serde::Deserialize;

use crate::wire::MAX_HEADER_LEN;

/// Core configuration. Capacities bound every table on the node; times are milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub max_neighbors: usize,
    /// Second-hop positions kept per neighbor and advertised per beacon (K).
    pub max_second_hop: usize,
    /// Capacity of the active registry; the seen registry has the same capacity.
    pub max_subscriptions: usize,
    pub max_readings: usize,
    pub max_sensors: usize,
    pub beacon_period_ms: u64,
    pub neighbor_timeout_ms: u64,
    /// After this uptime beacon period and neighbor timeout are doubled.
    pub bootstrap_ms: u64,
    /// Proximity radius used when routing readings to their owner.
    pub proximity_epsilon: f32,
    pub subscribe_jitter: Jitter,
    pub unsubscribe_jitter: Jitter,
    pub max_pending_rebroadcasts: usize,
}

/// Rebroadcast delay: `base_ms` plus a uniform draw from `[0, spread_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Jitter {
    pub base_ms: u64,
    pub spread_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_neighbors: 16,
            max_second_hop: MAX_HEADER_LEN as usize,
            max_subscriptions: 6,
            max_readings: 30,
            max_sensors: 5,
            beacon_period_ms: 30_000,
            neighbor_timeout_ms: 60_000,
            bootstrap_ms: 120_000,
            proximity_epsilon: 0.05,
            subscribe_jitter: Jitter {
                base_ms: 500,
                spread_ms: 2000,
            },
            unsubscribe_jitter: Jitter {
                base_ms: 500,
                spread_ms: 1000,
            },
            max_pending_rebroadcasts: 4,
        }
    }
}

impl Config {
    /// K, clamped to what the beacon header can describe.
    pub fn second_hop_limit(&self) -> usize {
        self.max_second_hop.min(MAX_HEADER_LEN as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_hop_limit_is_clamped() {
        let c = Config {
            max_second_hop: 8,
            ..Config::default()
        };
        assert_eq!(c.second_hop_limit(), 7);
        let c = Config {
            max_second_hop: 3,
            ..Config::default()
        };
        assert_eq!(c.second_hop_limit(), 3);
    }
}
