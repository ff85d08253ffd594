//! Bounded FIFO of sensor readings, shared by sampling nodes (local samples
//! awaiting aggregation) and owners (readings received from the region).

use crate::config::Config;
use crate::geo::Address;
use crate::pool::{Pool, PoolFull};
use crate::protocol::{SensorType, Sid, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub sid: Sid,
    pub sensor: SensorType,
    /// Node the value came from (ourselves for local samples).
    pub origin: Address,
    pub value: Value,
}

/// Which readings a query applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Subscription(Sid),
    Sensor(SensorType),
}

impl Selector {
    fn matches(&self, r: &Reading) -> bool {
        match *self {
            Selector::Subscription(sid) => r.sid == sid,
            Selector::Sensor(sensor) => r.sensor == sensor,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadingStore {
    readings: Pool<Reading>,
}

impl ReadingStore {
    pub fn new(config: &Config) -> Self {
        Self {
            readings: Pool::with_capacity(config.max_readings),
        }
    }

    /// Append a reading. When full, evicts the oldest reading of the same
    /// subscription and retries once.
    pub fn store(&mut self, reading: Reading) -> Result<(), PoolFull> {
        match self.readings.insert(reading) {
            Ok(_) => Ok(()),
            Err(full) => {
                self.readings
                    .remove_first(|r| r.sid == reading.sid)
                    .ok_or(full)?;
                self.readings.insert(reading).map(|_| ())
            }
        }
    }

    /// Pop the oldest matching reading.
    pub fn take_oldest(&mut self, selector: Selector) -> Option<Reading> {
        self.readings.remove_first(|r| selector.matches(r))
    }

    pub fn has_readings(&self, selector: Selector) -> bool {
        self.readings.find(|r| selector.matches(r)).is_some()
    }

    /// Drop every reading of a subscription. Returns how many were removed.
    pub fn discard(&mut self, sid: Sid) -> usize {
        self.readings.drain_where(|r| r.sid == sid).len()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(sid: u16, v: u8) -> Reading {
        Reading {
            sid: Sid(sid),
            sensor: SensorType(sid as u8),
            origin: Address::new(2, 0),
            value: Value::U8(v),
        }
    }

    fn store(cap: usize) -> ReadingStore {
        ReadingStore::new(&Config {
            max_readings: cap,
            ..Config::default()
        })
    }

    #[test]
    fn fifo_per_selector() {
        let mut s = store(4);
        s.store(reading(1, 10)).unwrap();
        s.store(reading(2, 20)).unwrap();
        s.store(reading(1, 11)).unwrap();
        assert_eq!(s.take_oldest(Selector::Subscription(Sid(1))).unwrap().value, Value::U8(10));
        assert_eq!(s.take_oldest(Selector::Sensor(SensorType(1))).unwrap().value, Value::U8(11));
        assert!(!s.has_readings(Selector::Subscription(Sid(1))));
        assert!(s.has_readings(Selector::Subscription(Sid(2))));
        assert_eq!(s.take_oldest(Selector::Subscription(Sid(1))), None);
    }

    #[test]
    fn full_store_evicts_oldest_of_same_sid() {
        let mut s = store(3);
        s.store(reading(1, 1)).unwrap();
        s.store(reading(2, 2)).unwrap();
        s.store(reading(1, 3)).unwrap();
        s.store(reading(1, 4)).unwrap();
        assert_eq!(s.len(), 3);
        let ones: Vec<_> = std::iter::from_fn(|| s.take_oldest(Selector::Subscription(Sid(1))))
            .map(|r| r.value)
            .collect();
        assert_eq!(ones, vec![Value::U8(3), Value::U8(4)]);
        assert_eq!(s.take_oldest(Selector::Subscription(Sid(2))).unwrap().value, Value::U8(2));
    }

    #[test]
    fn overflow_of_one_sid_keeps_newest() {
        let mut s = store(3);
        for v in 0..=3 {
            s.store(reading(1, v)).unwrap();
        }
        assert_eq!(s.len(), 3);
        let kept: Vec<_> = std::iter::from_fn(|| s.take_oldest(Selector::Subscription(Sid(1))))
            .map(|r| r.value)
            .collect();
        assert_eq!(kept, vec![Value::U8(1), Value::U8(2), Value::U8(3)]);
    }

    #[test]
    fn full_store_without_same_sid_fails() {
        let mut s = store(2);
        s.store(reading(1, 1)).unwrap();
        s.store(reading(2, 2)).unwrap();
        assert_eq!(s.store(reading(3, 3)), Err(PoolFull { capacity: 2 }));
        assert!(!s.has_readings(Selector::Subscription(Sid(3))));
    }

    #[test]
    fn discard_drops_one_subscription() {
        let mut s = store(4);
        s.store(reading(1, 1)).unwrap();
        s.store(reading(2, 2)).unwrap();
        s.store(reading(1, 3)).unwrap();
        assert_eq!(s.discard(Sid(1)), 2);
        assert_eq!(s.len(), 1);
    }
}
