//! Radio emulation: link frames over UDP multicast, filtered by the sender's
//! transmit range (unit disk).

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};
use geoware_core::{distance, Address, Position};
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tracing::trace;

const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 60, 61);
/// Largest frame we accept; GeoWare packets are far smaller.
const MAX_DATAGRAM: usize = 512;

/// One transmission on the emulated channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkFrame {
    pub from: Address,
    /// Transmitter position, used only to emulate radio range.
    pub from_position: Position,
    /// Transmit range of the sender at the time of sending.
    pub range: f32,
    pub kind: FrameKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameKind {
    Broadcast {
        payload: Vec<u8>,
    },
    /// One hop of a multihop packet.
    Unicast {
        to: Address,
        originator: Address,
        receiver: Address,
        hops: u8,
        payload: Vec<u8>,
    },
}

/// Whether a frame is audible at `me` located at `position`.
pub fn audible(frame: &LinkFrame, me: Address, position: Position) -> bool {
    if frame.from == me {
        return false;
    }
    if distance(&frame.from_position, &position) > frame.range {
        return false;
    }
    match &frame.kind {
        FrameKind::Broadcast { .. } => true,
        FrameKind::Unicast { to, .. } => *to == me,
    }
}

pub struct Radio {
    socket: UdpSocket,
    group: SocketAddr,
    address: Address,
    range: f32,
}

impl Radio {
    pub async fn bind(port: u16, address: Address, range: f32) -> Result<Self> {
        let socket = make_multicast_socket(port)
            .with_context(|| format!("binding radio socket on port {}", port))?;
        Ok(Self {
            socket,
            group: SocketAddr::from((MULTICAST_GROUP, port)),
            address,
            range,
        })
    }

    pub fn range(&self) -> f32 {
        self.range
    }

    pub fn set_range(&mut self, range: f32) {
        self.range = range;
    }

    pub async fn send(&self, position: Position, kind: FrameKind) -> Result<()> {
        let frame = LinkFrame {
            from: self.address,
            from_position: position,
            range: self.range,
            kind,
        };
        let bytes = bincode::serialize(&frame)?;
        self.socket
            .send_to(&bytes, self.group)
            .await
            .context("radio send")?;
        Ok(())
    }

    /// Next frame audible at `position`. Cancel safe.
    pub async fn recv(&self, position: Position) -> Result<LinkFrame> {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (n, peer) = self.socket.recv_from(&mut buf).await.context("radio recv")?;
            let frame: LinkFrame = match bincode::deserialize(&buf[..n]) {
                Ok(f) => f,
                Err(e) => {
                    trace!(%peer, "undecodable frame: {}", e);
                    continue;
                }
            };
            if audible(&frame, self.address, position) {
                return Ok(frame);
            }
        }
    }
}

fn make_multicast_socket(port: u16) -> std::io::Result<UdpSocket> {
    let std_sock = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
    std_sock.join_multicast_v4(&MULTICAST_GROUP, &Ipv4Addr::UNSPECIFIED)?;
    std_sock.set_multicast_ttl_v4(1)?;
    std_sock.set_multicast_loop_v4(true)?;
    std_sock.set_nonblocking(true)?;
    UdpSocket::from_std(std_sock)
}
