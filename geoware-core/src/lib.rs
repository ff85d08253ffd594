//! GeoWare: geographic routing and region-scoped publish/subscribe for sensor motes.
//! Host-driven: no I/O; host passes link events and ticks and receives actions.

pub mod aggregate;
pub mod config;
pub mod geo;
pub mod neighbor;
pub mod node;
pub mod pool;
pub mod propagation;
pub mod protocol;
pub mod router;
pub mod sensor;
pub mod store;
pub mod subscription;
pub mod wire;

pub use config::Config;
pub use geo::{distance, Address, Position};
pub use node::{Action, GeoNode, NodeError, SubscribeRequest};
pub use protocol::{Aggregation, Packet, SensorType, Sid, Value, ValueKind, PROTOCOL_VERSION};
pub use router::{Hop, HopKind};
pub use sensor::{SensorError, SensorSpec};
pub use store::Reading;
pub use wire::{decode, encode, WireEncodeError, WireError};
