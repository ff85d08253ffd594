//! GeoWare wire protocol: packet types, version and packet bodies.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geo::{distance, Address, Position};

/// Current protocol version, carried in the low two bits of every header.
pub const PROTOCOL_VERSION: u8 = 1;

/// Packet type field of the header (3 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Reserved = 0,
    Beacon = 1,
    Subscribe = 2,
    Unsubscribe = 3,
    /// Recognised on the wire but never handled.
    SidDiscovery = 4,
    Reading = 5,
}

impl TryFrom<u8> for PacketType {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, u8> {
        Ok(match v {
            0 => PacketType::Reserved,
            1 => PacketType::Beacon,
            2 => PacketType::Subscribe,
            3 => PacketType::Unsubscribe,
            4 => PacketType::SidDiscovery,
            5 => PacketType::Reading,
            other => return Err(other),
        })
    }
}

/// Subscription ID, chosen at random by the owner. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sid(pub u16);

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sensor type identifier. Meaning is deployment-defined (see the sensor registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorType(pub u8);

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Static value kind of a sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    U8,
    U16,
    F32,
}

/// A sensor value. The variant is the tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    U8(u8),
    U16(u16),
    F32(f32),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::U8(_) => ValueKind::U8,
            Value::U16(_) => ValueKind::U16,
            Value::F32(_) => ValueKind::F32,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U8(v) => write!(f, "{}", v),
            Value::U16(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{:.2}", v),
        }
    }
}

/// In-network aggregation applied by sampling nodes before publishing. One byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Aggregation {
    #[default]
    None,
    Max,
    Average,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown aggregation {0}")]
pub struct UnknownAggregation(pub u8);

impl From<Aggregation> for u8 {
    fn from(a: Aggregation) -> u8 {
        match a {
            Aggregation::None => 0,
            Aggregation::Max => 1,
            Aggregation::Average => 2,
        }
    }
}

impl TryFrom<u8> for Aggregation {
    type Error = UnknownAggregation;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Aggregation::None),
            1 => Ok(Aggregation::Max),
            2 => Ok(Aggregation::Average),
            other => Err(UnknownAggregation(other)),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Aggregation::None => "none",
            Aggregation::Max => "max",
            Aggregation::Average => "avg",
        })
    }
}

/// A subscription as flooded through the region and held in registries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub sid: Sid,
    pub owner_address: Address,
    pub owner_position: Position,
    pub sensor: SensorType,
    pub period_ms: u32,
    pub aggregation: Aggregation,
    /// Samples per published value.
    pub window: u8,
    pub center: Position,
    pub radius: f32,
}

impl Subscription {
    /// Whether `pos` lies inside the region of interest (boundary included).
    pub fn contains(&self, pos: &Position) -> bool {
        distance(pos, &self.center) <= self.radius
    }
}

/// Periodic neighbor advertisement. `second_hop` is our own neighbor list, truncated.
#[derive(Debug, Clone, PartialEq)]
pub struct Beacon {
    pub sender: Position,
    pub second_hop: Vec<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribePacket {
    pub sender: Position,
    /// Set by the owner; in-region nodes rebroadcast only when it is set.
    pub firework: bool,
    pub subscription: Subscription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsubscribePacket {
    pub sender: Position,
    pub firework: bool,
    pub sid: Sid,
    pub center: Position,
    pub radius: f32,
}

impl UnsubscribePacket {
    pub fn for_subscription(sender: Position, sub: &Subscription) -> Self {
        Self {
            sender,
            firework: true,
            sid: sub.sid,
            center: sub.center,
            radius: sub.radius,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingPacket {
    pub sender: Position,
    pub sid: Sid,
    pub owner_position: Position,
    pub value: Value,
}

/// Any decoded packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Beacon(Beacon),
    Subscribe(SubscribePacket),
    Unsubscribe(UnsubscribePacket),
    Reading(ReadingPacket),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Beacon(_) => PacketType::Beacon,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::Reading(_) => PacketType::Reading,
        }
    }

    /// Position of the node that last transmitted the packet.
    pub fn sender(&self) -> Position {
        match self {
            Packet::Beacon(p) => p.sender,
            Packet::Subscribe(p) => p.sender,
            Packet::Unsubscribe(p) => p.sender,
            Packet::Reading(p) => p.sender,
        }
    }
}
