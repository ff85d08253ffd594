//! Host-driven API: GeoNode receives link events and timer ticks from the host, returns actions.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace, warn};

use crate::aggregate;
use crate::config::{Config, Jitter};
use crate::geo::{Address, Position};
use crate::neighbor::NeighborTable;
use crate::propagation::{self, UnsubscribeOutcome};
use crate::protocol::{
    Aggregation, Beacon, Packet, ReadingPacket, SensorType, Sid, SubscribePacket, Subscription,
    UnsubscribePacket,
};
use crate::router::{self, Hop, RouteRequest};
use crate::sensor::{ReadFn, SensorError, SensorRegistry, SensorSpec};
use crate::store::{Reading, ReadingStore, Selector};
use crate::subscription::SubscriptionRegistry;
use crate::wire::{self, WireEncodeError};

/// Delay before the first beacon: fixed part plus a uniform spread.
const FIRST_BEACON: Jitter = Jitter {
    base_ms: 1000,
    spread_ms: 2000,
};

/// What the host must do after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send on the link-layer broadcast channel.
    Broadcast(Vec<u8>),
    /// Send on the multihop channel toward `Address::UNRESOLVED`; the
    /// transport routes it with `GeoNode::forward`.
    Multihop(Vec<u8>),
    /// A reading for an owned subscription arrived; fetch it with `take_reading`.
    ReadingAvailable(Sid),
}

/// What to subscribe to and where.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscribeRequest {
    pub sensor: SensorType,
    pub period_ms: u32,
    pub aggregation: Aggregation,
    pub window: u8,
    pub center: Position,
    pub radius: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("subscription registry full")]
    RegistryFull,
    #[error("unknown subscription {0}")]
    UnknownSubscription(Sid),
    #[error(transparent)]
    Sensor(#[from] SensorError),
    #[error("encode error: {0}")]
    Encode(#[from] WireEncodeError),
}

struct PendingRebroadcast {
    due_ms: u64,
    bytes: Vec<u8>,
}

/// One GeoWare node. Host passes events; node returns actions.
pub struct GeoNode {
    config: Config,
    address: Address,
    position: Position,
    rng: StdRng,
    neighbors: NeighborTable,
    subscriptions: SubscriptionRegistry,
    readings: ReadingStore,
    sensors: SensorRegistry,
    next_beacon_ms: Option<u64>,
    pending: Vec<PendingRebroadcast>,
}

impl GeoNode {
    pub fn new(address: Address, position: Position, config: Config) -> Self {
        Self::with_rng(address, position, config, StdRng::from_entropy())
    }

    /// Deterministic node for simulations and tests.
    pub fn with_seed(address: Address, position: Position, config: Config, seed: u64) -> Self {
        Self::with_rng(address, position, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(address: Address, position: Position, config: Config, rng: StdRng) -> Self {
        Self {
            neighbors: NeighborTable::new(&config),
            subscriptions: SubscriptionRegistry::new(&config),
            readings: ReadingStore::new(&config),
            sensors: SensorRegistry::new(config.max_sensors),
            config,
            address,
            position,
            rng,
            next_beacon_ms: None,
            pending: Vec::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Update our coordinates (e.g. after localisation). Takes effect in the next beacon.
    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn readings(&self) -> &ReadingStore {
        &self.readings
    }

    pub fn sensors(&self) -> &SensorRegistry {
        &self.sensors
    }

    pub fn pending_rebroadcasts(&self) -> usize {
        self.pending.len()
    }

    pub fn register_sensor(&mut self, spec: SensorSpec, read: ReadFn) -> Result<(), NodeError> {
        let (id, kind) = (spec.id, spec.kind);
        self.sensors.register(spec, read)?;
        info!(sensor = %id, kind = ?kind, "sensor registered");
        Ok(())
    }

    /// Start a subscription owned by this node. The subscribe packet is routed
    /// toward the region center and flooded from there.
    pub fn subscribe(&mut self, req: SubscribeRequest) -> Result<(Sid, Vec<Action>), NodeError> {
        if self.subscriptions.is_full() {
            return Err(NodeError::RegistryFull);
        }
        let subscription = Subscription {
            sid: Sid(self.rng.gen_range(1..=u16::MAX)),
            owner_address: self.address,
            owner_position: self.position,
            sensor: req.sensor,
            period_ms: req.period_ms,
            aggregation: req.aggregation,
            window: req.window,
            center: req.center,
            radius: req.radius,
        };
        let sid = subscription.sid;
        let bytes = wire::encode(&Packet::Subscribe(SubscribePacket {
            sender: self.position,
            firework: true,
            subscription: subscription.clone(),
        }))?;
        self.subscriptions
            .add_subscription(subscription, None)
            .map_err(|_| NodeError::RegistryFull)?;
        info!(%sid, sensor = %req.sensor, center = %req.center, radius = req.radius, "subscribed");
        Ok((sid, vec![Action::Multihop(bytes)]))
    }

    /// Cancel a subscription and route the unsubscribe toward its region.
    pub fn unsubscribe(&mut self, sid: Sid) -> Result<Vec<Action>, NodeError> {
        let sub = self
            .subscriptions
            .get(sid)
            .map(|a| a.subscription.clone())
            .ok_or(NodeError::UnknownSubscription(sid))?;
        let bytes = wire::encode(&Packet::Unsubscribe(UnsubscribePacket::for_subscription(
            self.position,
            &sub,
        )))?;
        self.subscriptions.remove_subscription(sid);
        info!(%sid, "unsubscribed");
        Ok(vec![Action::Multihop(bytes)])
    }

    /// Link-layer broadcast received from neighbor `from`.
    pub fn on_broadcast(&mut self, from: Address, bytes: &[u8], now_ms: u64) {
        let packet = match wire::decode(bytes) {
            Ok(p) => p,
            Err(e) => {
                trace!(%from, "broadcast dropped: {}", e);
                return;
            }
        };
        match packet {
            Packet::Beacon(b) => {
                self.neighbors
                    .on_beacon(from, b.sender, &b.second_hop, now_ms);
            }
            Packet::Subscribe(p) => {
                self.neighbors.on_packet_hint(from, p.sender, now_ms);
                self.handle_subscribe(bytes, &p, now_ms);
            }
            Packet::Unsubscribe(p) => {
                self.neighbors.on_packet_hint(from, p.sender, now_ms);
                self.handle_unsubscribe(bytes, &p, now_ms);
            }
            Packet::Reading(_) => trace!(%from, "reading on broadcast channel ignored"),
        }
    }

    /// Multihop packet for which we are the final receiver. `originator` is the
    /// node that sent it, `previous_hop` the neighbor that relayed it to us.
    pub fn on_deliver(
        &mut self,
        bytes: &[u8],
        originator: Address,
        previous_hop: Address,
        hops: u8,
        now_ms: u64,
    ) -> Vec<Action> {
        let packet = match wire::decode(bytes) {
            Ok(p) => p,
            Err(e) => {
                trace!(%originator, "multihop packet dropped: {}", e);
                return Vec::new();
            }
        };
        // The sender position is the originator's; it only describes the previous hop on hop one.
        if hops == 1 {
            self.neighbors
                .on_packet_hint(previous_hop, packet.sender(), now_ms);
        }
        match packet {
            Packet::Subscribe(p) => {
                self.handle_subscribe(bytes, &p, now_ms);
                Vec::new()
            }
            Packet::Unsubscribe(p) => {
                self.handle_unsubscribe(bytes, &p, now_ms);
                Vec::new()
            }
            Packet::Reading(r) => self.handle_reading(originator, &r),
            Packet::Beacon(_) => Vec::new(),
        }
    }

    /// Pick the next hop for a multihop packet passing through us (including
    /// ones we originate, with `hops == 0` and `previous_hop` our own address).
    pub fn forward(
        &mut self,
        bytes: &[u8],
        receiver: Address,
        previous_hop: Address,
        hops: u8,
    ) -> Option<Hop> {
        let packet = match wire::decode(bytes) {
            Ok(p) => p,
            Err(e) => {
                trace!("not forwarding: {}", e);
                return None;
            }
        };
        let (destination, proximity) = match &packet {
            Packet::Reading(r) => (r.owner_position, self.config.proximity_epsilon),
            Packet::Subscribe(p) => (p.subscription.center, p.subscription.radius),
            Packet::Unsubscribe(p) => (p.center, p.radius),
            Packet::Beacon(_) => return None,
        };
        let request = RouteRequest {
            destination,
            proximity,
            receiver,
            previous_hop,
            hops,
        };
        let hop = router::select_next_hop(
            self.address,
            self.position,
            &request,
            &self.neighbors,
            &mut self.rng,
        );
        match hop {
            Some(h) => debug!(next = %h.address, kind = ?h.kind, %destination, "forwarding"),
            None => debug!(%destination, %previous_hop, "no route"),
        }
        hop
    }

    /// Advance timers. Order: neighbor expiry, beacon, rebroadcasts, samplers.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Action> {
        let mut actions = Vec::new();
        self.neighbors.expire(now_ms);
        if let Some(beacon) = self.beacon_if_due(now_ms) {
            actions.push(beacon);
        }
        self.flush_rebroadcasts(now_ms, &mut actions);
        for sid in self.subscriptions.due_samplers(now_ms) {
            self.sample(sid, now_ms, &mut actions);
        }
        actions
    }

    /// Oldest unread reading of a subscription.
    pub fn take_reading(&mut self, sid: Sid) -> Option<Reading> {
        self.readings.take_oldest(Selector::Subscription(sid))
    }

    pub fn take_reading_for_sensor(&mut self, sensor: SensorType) -> Option<Reading> {
        self.readings.take_oldest(Selector::Sensor(sensor))
    }

    pub fn has_readings(&self, sid: Sid) -> bool {
        self.readings.has_readings(Selector::Subscription(sid))
    }

    fn handle_subscribe(&mut self, bytes: &[u8], packet: &SubscribePacket, now_ms: u64) {
        let decision = propagation::on_subscribe(
            &mut self.subscriptions,
            &self.neighbors,
            self.position,
            packet,
            now_ms,
        );
        debug!(sid = %packet.subscription.sid, outcome = ?decision.outcome, rebroadcast = decision.rebroadcast, "subscribe");
        if decision.rebroadcast {
            self.queue_rebroadcast(bytes, self.config.subscribe_jitter, now_ms);
        }
    }

    fn handle_unsubscribe(&mut self, bytes: &[u8], packet: &UnsubscribePacket, now_ms: u64) {
        let decision = propagation::on_unsubscribe(&mut self.subscriptions, packet);
        debug!(sid = %packet.sid, outcome = ?decision.outcome, rebroadcast = decision.rebroadcast, "unsubscribe");
        if decision.outcome == UnsubscribeOutcome::Cancelled {
            let dropped = self.readings.discard(packet.sid);
            if dropped > 0 {
                debug!(sid = %packet.sid, dropped, "buffered samples discarded");
            }
        }
        if decision.rebroadcast {
            self.queue_rebroadcast(bytes, self.config.unsubscribe_jitter, now_ms);
        }
    }

    fn handle_reading(&mut self, originator: Address, packet: &ReadingPacket) -> Vec<Action> {
        let Some(active) = self.subscriptions.get(packet.sid) else {
            trace!(sid = %packet.sid, %originator, "reading for unknown subscription");
            return Vec::new();
        };
        let sensor = active.subscription.sensor;
        if let Some(spec) = self.sensors.get(sensor) {
            if spec.kind != packet.value.kind() {
                warn!(sid = %packet.sid, %originator, "reading kind {:?} does not match sensor {}", packet.value.kind(), sensor);
                return Vec::new();
            }
        }
        let reading = Reading {
            sid: packet.sid,
            sensor,
            origin: originator,
            value: packet.value,
        };
        match self.readings.store(reading) {
            Ok(()) => {
                debug!(sid = %packet.sid, %originator, value = %packet.value, "reading received");
                vec![Action::ReadingAvailable(packet.sid)]
            }
            Err(e) => {
                debug!(sid = %packet.sid, "reading not stored: {}", e);
                Vec::new()
            }
        }
    }

    fn jitter(&mut self, j: Jitter) -> u64 {
        let spread = if j.spread_ms > 0 {
            self.rng.gen_range(0..j.spread_ms)
        } else {
            0
        };
        j.base_ms.saturating_add(spread)
    }

    fn queue_rebroadcast(&mut self, bytes: &[u8], jitter: Jitter, now_ms: u64) {
        if self.pending.len() >= self.config.max_pending_rebroadcasts {
            debug!("rebroadcast queue full, dropping");
            return;
        }
        let due_ms = now_ms.saturating_add(self.jitter(jitter));
        self.pending.push(PendingRebroadcast {
            due_ms,
            bytes: bytes.to_vec(),
        });
    }

    fn flush_rebroadcasts(&mut self, now_ms: u64, actions: &mut Vec<Action>) {
        let (mut due, rest): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due_ms <= now_ms);
        self.pending = rest;
        due.sort_by_key(|p| p.due_ms);
        for mut p in due {
            match wire::restamp(&mut p.bytes, self.position) {
                Ok(()) => actions.push(Action::Broadcast(p.bytes)),
                Err(e) => trace!("rebroadcast dropped: {}", e),
            }
        }
    }

    fn beacon_if_due(&mut self, now_ms: u64) -> Option<Action> {
        let Some(due) = self.next_beacon_ms else {
            self.next_beacon_ms = Some(now_ms.saturating_add(self.jitter(FIRST_BEACON)));
            return None;
        };
        if now_ms < due {
            return None;
        }
        let period = if now_ms < self.config.bootstrap_ms {
            self.config.beacon_period_ms
        } else {
            self.config.beacon_period_ms.saturating_mul(2)
        };
        let next = self.jitter(Jitter {
            base_ms: period / 2,
            spread_ms: period,
        });
        self.next_beacon_ms = Some(now_ms.saturating_add(next));

        let beacon = Packet::Beacon(Beacon {
            sender: self.position,
            second_hop: self.neighbors.beacon_positions(),
        });
        match wire::encode(&beacon) {
            Ok(bytes) => Some(Action::Broadcast(bytes)),
            Err(e) => {
                warn!("beacon not sent: {}", e);
                None
            }
        }
    }

    fn sample(&mut self, sid: Sid, now_ms: u64, actions: &mut Vec<Action>) {
        let Some((sub, mut sampler)) = self
            .subscriptions
            .get(sid)
            .and_then(|a| Some((a.subscription.clone(), a.sampler?)))
        else {
            return;
        };

        let stored = match self.sensors.read(sub.sensor) {
            Ok(value) => {
                let reading = Reading {
                    sid,
                    sensor: sub.sensor,
                    origin: self.address,
                    value,
                };
                match self.readings.store(reading) {
                    Ok(()) => true,
                    Err(e) => {
                        debug!(%sid, "sample not stored: {}", e);
                        false
                    }
                }
            }
            Err(e @ SensorError::Unknown(_)) => {
                warn!(%sid, "sampling stopped: {}", e);
                if let Some(a) = self.subscriptions.get_mut(sid) {
                    a.sampler = None;
                }
                return;
            }
            Err(e) => {
                warn!(%sid, "sample dropped: {}", e);
                false
            }
        };

        // Only stored samples count toward the window.
        if stored {
            sampler.collected = sampler.collected.saturating_add(1);
        }
        let publish = sampler.collected >= sub.window;
        if publish {
            sampler.collected = 0;
        }
        let period = u64::from(sub.period_ms);
        sampler.next_due_ms = sampler.next_due_ms.saturating_add(period);
        if sampler.next_due_ms <= now_ms {
            // Fell behind (host stalled); resume from now instead of bursting.
            sampler.next_due_ms = now_ms.saturating_add(period.max(1));
        }
        if let Some(a) = self.subscriptions.get_mut(sid) {
            a.sampler = Some(sampler);
        }
        if !publish {
            return;
        }

        let Some(kind) = self.sensors.get(sub.sensor).map(|s| s.kind) else {
            return;
        };
        let Some(value) =
            aggregate::reduce(&mut self.readings, sid, kind, sub.aggregation, sub.window)
        else {
            return;
        };
        let packet = Packet::Reading(ReadingPacket {
            sender: self.position,
            sid,
            owner_position: sub.owner_position,
            value,
        });
        match wire::encode(&packet) {
            Ok(bytes) => {
                debug!(%sid, %value, owner = %sub.owner_address, "publishing");
                actions.push(Action::Multihop(bytes));
            }
            Err(e) => warn!(%sid, "reading not published: {}", e),
        }
    }
}
