//! Multihop relay over the emulated radio. Every hop asks the node for the next
//! neighbor; the final receiver is fixed once the router resolves it.

use geoware_core::{Action, Address, GeoNode, HopKind};
use tracing::debug;

use crate::radio::FrameKind;

/// Outcome of a unicast frame addressed to us.
#[derive(Debug, PartialEq)]
pub enum Relay {
    /// Pass the packet on.
    Send(FrameKind),
    /// We are the final receiver; actions for the host.
    Deliver(Vec<Action>),
    Drop,
}

/// First hop of a packet we originate.
pub fn originate(node: &mut GeoNode, payload: Vec<u8>, max_hops: u8) -> Option<FrameKind> {
    let me = node.address();
    route(node, payload, me, Address::UNRESOLVED, me, 0, max_hops)
}

/// Handle one hop received from `from`.
#[allow(clippy::too_many_arguments)]
pub fn on_unicast(
    node: &mut GeoNode,
    from: Address,
    originator: Address,
    receiver: Address,
    hops: u8,
    payload: Vec<u8>,
    now_ms: u64,
    max_hops: u8,
) -> Relay {
    if receiver == node.address() {
        return Relay::Deliver(node.on_deliver(&payload, originator, from, hops, now_ms));
    }
    match route(node, payload, originator, receiver, from, hops, max_hops) {
        Some(frame) => Relay::Send(frame),
        None => Relay::Drop,
    }
}

fn route(
    node: &mut GeoNode,
    payload: Vec<u8>,
    originator: Address,
    receiver: Address,
    previous_hop: Address,
    hops: u8,
    max_hops: u8,
) -> Option<FrameKind> {
    if hops >= max_hops {
        debug!(%originator, hops, "hop limit reached");
        return None;
    }
    let hop = node.forward(&payload, receiver, previous_hop, hops)?;
    let receiver = if hop.kind == HopKind::Final {
        hop.address
    } else {
        receiver
    };
    Some(FrameKind::Unicast {
        to: hop.address,
        originator,
        receiver,
        hops: hops + 1,
        payload,
    })
}
