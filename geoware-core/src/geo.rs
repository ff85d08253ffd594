//! Geometry and link addressing: planar positions and 2-byte node addresses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Point on the deployment plane. Units are whatever the deployment uses (metres in the simulator).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f32 {
        distance(self, other)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Euclidean distance.
pub fn distance(a: &Position, b: &Position) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

/// Link-layer node address, written `a.b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 2]);

impl Address {
    /// Final receiver of a packet addressed to a position rather than a node.
    /// The router replaces it once a neighbor lies within the proximity radius.
    pub const UNRESOLVED: Address = Address([254, 254]);

    pub const fn new(a: u8, b: u8) -> Self {
        Self([a, b])
    }
}

impl From<u16> for Address {
    fn from(v: u16) -> Self {
        Self(v.to_be_bytes())
    }
}

impl From<Address> for u16 {
    fn from(a: Address) -> Self {
        u16::from_be_bytes(a.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0[0], self.0[1])
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid address {0:?}, expected a.b")]
pub struct AddressParseError(String);

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AddressParseError(s.to_string());
        match s.split_once('.') {
            Some((a, b)) => Ok(Address([
                a.trim().parse().map_err(|_| err())?,
                b.trim().parse().map_err(|_| err())?,
            ])),
            // Bare number: low byte, as mote IDs are assigned in the simulator.
            None => s
                .trim()
                .parse::<u8>()
                .map(|b| Address([b, 0]))
                .map_err(|_| err()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert_eq!(distance(&a, &b), 5.0);
        assert_eq!(b.distance_to(&a), 5.0);
        assert_eq!(distance(&a, &a), 0.0);
    }

    #[test]
    fn address_display_and_parse() {
        let a = Address::new(3, 0);
        assert_eq!(a.to_string(), "3.0");
        assert_eq!("3.0".parse::<Address>().unwrap(), a);
        assert_eq!("3".parse::<Address>().unwrap(), a);
        assert!("3.x".parse::<Address>().is_err());
        assert!("300.1".parse::<Address>().is_err());
    }

    #[test]
    fn address_u16_conversion() {
        let a = Address::from(0x0102);
        assert_eq!(a, Address::new(1, 2));
        assert_eq!(u16::from(a), 0x0102);
    }
}
