// GeoWare Linux node: radio emulation, multihop relay, fake sensors and shell around geoware-core.

mod config;
mod multihop;
mod radio;
mod sensors;
mod shell;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use geoware_core::{Action, GeoNode};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::multihop::Relay;
use crate::radio::{FrameKind, LinkFrame, Radio};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> Result<()> {
    let mut config_path = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("geoware-linux {}", VERSION);
                return Ok(());
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(args.next().context("--config needs a path")?));
            }
            other => bail!("unknown argument {:?}", other),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GEOWARE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load(config_path.as_deref())?;

    // One thread: the node is only ever touched from the event loop.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run(cfg))
}

struct Host {
    node: GeoNode,
    radio: Radio,
    max_hops: u8,
    start: Instant,
}

impl Host {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    async fn transmit(&self, kind: FrameKind) {
        if let Err(e) = self.radio.send(self.node.position(), kind).await {
            warn!("{:#}", e);
        }
    }

    async fn perform(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast(payload) => self.transmit(FrameKind::Broadcast { payload }).await,
                Action::Multihop(payload) => {
                    match multihop::originate(&mut self.node, payload, self.max_hops) {
                        Some(kind) => self.transmit(kind).await,
                        None => debug!("multihop send dropped: no route"),
                    }
                }
                Action::ReadingAvailable(sid) => {
                    while let Some(r) = self.node.take_reading(sid) {
                        info!(%sid, sensor = %r.sensor, from = %r.origin, value = %r.value, "reading");
                    }
                }
            }
        }
    }

    async fn on_frame(&mut self, frame: LinkFrame) {
        let now = self.now_ms();
        match frame.kind {
            FrameKind::Broadcast { payload } => self.node.on_broadcast(frame.from, &payload, now),
            FrameKind::Unicast {
                originator,
                receiver,
                hops,
                payload,
                ..
            } => {
                let relay = multihop::on_unicast(
                    &mut self.node,
                    frame.from,
                    originator,
                    receiver,
                    hops,
                    payload,
                    now,
                    self.max_hops,
                );
                match relay {
                    Relay::Send(kind) => self.transmit(kind).await,
                    Relay::Deliver(actions) => self.perform(actions).await,
                    Relay::Drop => debug!(%originator, "relay dropped: no route"),
                }
            }
        }
    }
}

async fn run(cfg: config::Config) -> Result<()> {
    let address = cfg.node_address()?;
    let mut node = GeoNode::new(address, cfg.position(), cfg.node.clone());
    sensors::register_all(&mut node)?;
    let radio = Radio::bind(cfg.port, address, cfg.radio_range).await?;
    info!(%address, position = %node.position(), port = cfg.port, range = cfg.radio_range, "node up");

    let mut host = Host {
        node,
        radio,
        max_hops: cfg.max_hops,
        start: Instant::now(),
    };

    let (cmd_tx, mut cmd_rx) = mpsc::channel(16);
    tokio::spawn(shell::read_commands(cmd_tx));

    let mut ticker = tokio::time::interval(Duration::from_millis(cfg.tick_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let position = host.node.position();
        tokio::select! {
            _ = ticker.tick() => {
                let now = host.now_ms();
                let actions = host.node.tick(now);
                host.perform(actions).await;
            }
            frame = host.radio.recv(position) => {
                host.on_frame(frame?).await;
            }
            Some(cmd) = cmd_rx.recv() => {
                let actions = shell::execute(cmd, &mut host.node, &mut host.radio);
                host.perform(actions).await;
            }
            res = &mut shutdown => {
                res?;
                info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
