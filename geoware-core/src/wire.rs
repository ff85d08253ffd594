//! Framing: one header byte (version | type | length) + bincode body.
//!
//! Header bits 0-1 carry the version, bits 2-4 the packet type, bits 5-7 a length
//! field used only by beacons (number of second-hop positions). Every body starts
//! with the sender position, so relays can re-stamp bytes 1..9 in place.

use std::io::Read;

use crate::geo::Position;
use crate::protocol::{
    Beacon, Packet, PacketType, ReadingPacket, SubscribePacket, UnsubscribePacket,
    PROTOCOL_VERSION,
};

/// Largest value the 3-bit length field can carry.
pub const MAX_HEADER_LEN: u8 = 0b111;

const POSITION_SIZE: usize = 8;

/// Decoded header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub packet_type: PacketType,
    pub len: u8,
}

impl Header {
    pub fn new(packet_type: PacketType, len: u8) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            packet_type,
            len,
        }
    }

    pub fn to_byte(self) -> u8 {
        (self.version & 0b11) | ((self.packet_type as u8 & 0b111) << 2) | ((self.len & 0b111) << 5)
    }

    /// Parse a header byte. Fails on version mismatch or an unassigned type.
    pub fn from_byte(b: u8) -> Result<Self, WireError> {
        let version = b & 0b11;
        if version != PROTOCOL_VERSION {
            return Err(WireError::VersionMismatch(version));
        }
        let packet_type =
            PacketType::try_from((b >> 2) & 0b111).map_err(WireError::UnknownType)?;
        Ok(Self {
            version,
            packet_type,
            len: b >> 5,
        })
    }
}

/// Encode a packet: header byte followed by its bincode body.
pub fn encode(packet: &Packet) -> Result<Vec<u8>, WireEncodeError> {
    let mut out = Vec::with_capacity(48);
    match packet {
        Packet::Beacon(b) => {
            let len = u8::try_from(b.second_hop.len())
                .ok()
                .filter(|&n| n <= MAX_HEADER_LEN)
                .ok_or(WireEncodeError::TooManyPositions(b.second_hop.len()))?;
            out.push(Header::new(PacketType::Beacon, len).to_byte());
            bincode::serialize_into(&mut out, &b.sender)?;
            for pos in &b.second_hop {
                bincode::serialize_into(&mut out, pos)?;
            }
        }
        Packet::Subscribe(p) => {
            out.push(Header::new(PacketType::Subscribe, 0).to_byte());
            bincode::serialize_into(&mut out, p)?;
        }
        Packet::Unsubscribe(p) => {
            out.push(Header::new(PacketType::Unsubscribe, 0).to_byte());
            bincode::serialize_into(&mut out, p)?;
        }
        Packet::Reading(p) => {
            out.push(Header::new(PacketType::Reading, 0).to_byte());
            bincode::serialize_into(&mut out, p)?;
        }
    }
    Ok(out)
}

/// Error encoding a packet.
#[derive(Debug, thiserror::Error)]
pub enum WireEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("{0} second-hop positions do not fit the length field")]
    TooManyPositions(usize),
}

/// Decode a packet. Trailing bytes after the body are ignored.
pub fn decode(bytes: &[u8]) -> Result<Packet, WireError> {
    let (&first, mut body) = bytes.split_first().ok_or(WireError::Empty)?;
    let header = Header::from_byte(first)?;
    let packet = match header.packet_type {
        PacketType::Beacon => {
            let sender: Position = read_body(&mut body)?;
            let second_hop = (0..header.len)
                .map(|_| read_body(&mut body))
                .collect::<Result<Vec<Position>, _>>()?;
            Packet::Beacon(Beacon { sender, second_hop })
        }
        PacketType::Subscribe => Packet::Subscribe(read_body::<SubscribePacket>(&mut body)?),
        PacketType::Unsubscribe => {
            Packet::Unsubscribe(read_body::<UnsubscribePacket>(&mut body)?)
        }
        PacketType::Reading => Packet::Reading(read_body::<ReadingPacket>(&mut body)?),
        t @ (PacketType::Reserved | PacketType::SidDiscovery) => {
            return Err(WireError::Unsupported(t))
        }
    };
    Ok(packet)
}

fn read_body<T: serde::de::DeserializeOwned>(body: &mut impl Read) -> Result<T, WireError> {
    Ok(bincode::deserialize_from(body)?)
}

/// Overwrite the sender position of an encoded packet, leaving everything else intact.
pub fn restamp(bytes: &mut [u8], sender: Position) -> Result<(), WireError> {
    let Some(slot) = bytes.get_mut(1..1 + POSITION_SIZE) else {
        return Err(WireError::Empty);
    };
    bincode::serialize_into(slot, &sender)?;
    Ok(())
}

/// Error decoding a packet. All of these mean "drop it".
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("packet too short")]
    Empty,
    #[error("protocol version mismatch (got {0})")]
    VersionMismatch(u8),
    #[error("unknown packet type {0}")]
    UnknownType(u8),
    #[error("unsupported packet type {0:?}")]
    Unsupported(PacketType),
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Address;
    use crate::protocol::{Aggregation, SensorType, Sid, Subscription, Value};

    fn sample_subscribe() -> Packet {
        Packet::Subscribe(SubscribePacket {
            sender: Position::new(1.0, 2.0),
            firework: true,
            subscription: Subscription {
                sid: Sid(0xBEEF),
                owner_address: Address::new(1, 0),
                owner_position: Position::new(1.0, 2.0),
                sensor: SensorType(2),
                period_ms: 5000,
                aggregation: Aggregation::Average,
                window: 4,
                center: Position::new(50.0, 60.0),
                radius: 25.0,
            },
        })
    }

    #[test]
    fn header_bit_layout() {
        let h = Header::new(PacketType::Beacon, 3);
        assert_eq!(h.to_byte(), 0b011_001_01);
        assert_eq!(Header::from_byte(0b011_001_01).unwrap(), h);
    }

    #[test]
    fn subscribe_layout_and_decode() {
        let pkt = sample_subscribe();
        let bytes = encode(&pkt).unwrap();
        // header + sender + firework + sid, owner, owner pos, sensor, period, aggr, window, center, radius
        assert_eq!(bytes.len(), 1 + 8 + 1 + 2 + 2 + 8 + 1 + 4 + 1 + 1 + 8 + 4);
        assert_eq!(bytes[0], Header::new(PacketType::Subscribe, 0).to_byte());
        assert_eq!(bytes[9], 1);
        assert_eq!(&bytes[10..12], &0xBEEFu16.to_le_bytes());
        assert_eq!(decode(&bytes).unwrap(), pkt);
    }

    #[test]
    fn beacon_carries_second_hop_count_in_header() {
        let pkt = Packet::Beacon(Beacon {
            sender: Position::new(0.0, 0.0),
            second_hop: vec![Position::new(1.0, 1.0), Position::new(2.0, 2.0)],
        });
        let bytes = encode(&pkt).unwrap();
        assert_eq!(bytes.len(), 1 + 3 * 8);
        assert_eq!(Header::from_byte(bytes[0]).unwrap().len, 2);
        assert_eq!(decode(&bytes).unwrap(), pkt);
    }

    #[test]
    fn beacon_rejects_oversized_second_hop() {
        let pkt = Packet::Beacon(Beacon {
            sender: Position::default(),
            second_hop: vec![Position::default(); 8],
        });
        assert!(matches!(
            encode(&pkt),
            Err(WireEncodeError::TooManyPositions(8))
        ));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let mut bytes = encode(&sample_subscribe()).unwrap();
        bytes[0] = (bytes[0] & !0b11) | 2;
        assert!(matches!(decode(&bytes), Err(WireError::VersionMismatch(2))));
    }

    #[test]
    fn sid_discovery_and_unknown_types_are_rejected() {
        let sd = Header::new(PacketType::SidDiscovery, 0).to_byte();
        assert!(matches!(
            decode(&[sd, 0, 0]),
            Err(WireError::Unsupported(PacketType::SidDiscovery))
        ));
        let unknown = PROTOCOL_VERSION | (7 << 2);
        assert!(matches!(decode(&[unknown]), Err(WireError::UnknownType(7))));
        assert!(matches!(decode(&[]), Err(WireError::Empty)));
    }

    #[test]
    fn truncated_body_is_a_decode_error() {
        let bytes = encode(&sample_subscribe()).unwrap();
        assert!(matches!(
            decode(&bytes[..bytes.len() - 1]),
            Err(WireError::Decode(_))
        ));
    }

    #[test]
    fn restamp_rewrites_only_sender() {
        let pkt = Packet::Reading(ReadingPacket {
            sender: Position::new(1.0, 1.0),
            sid: Sid(7),
            owner_position: Position::new(9.0, 9.0),
            value: Value::U16(300),
        });
        let mut bytes = encode(&pkt).unwrap();
        let tail = bytes[9..].to_vec();
        restamp(&mut bytes, Position::new(4.0, 5.0)).unwrap();
        assert_eq!(&bytes[9..], &tail[..]);
        match decode(&bytes).unwrap() {
            Packet::Reading(r) => {
                assert_eq!(r.sender, Position::new(4.0, 5.0));
                assert_eq!(r.value, Value::U16(300));
            }
            other => panic!("expected Reading, got {:?}", other),
        }
        assert!(restamp(&mut [0u8; 4], Position::default()).is_err());
    }
}
