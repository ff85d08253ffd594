//! Operator shell on stdin.

use anyhow::{bail, Context, Result};
use geoware_core::{Action, Aggregation, GeoNode, Position, Sid, SubscribeRequest};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::radio::Radio;
use crate::sensors;

pub const HELP: &str = "\
commands:
  subscribe <sensor> <period_ms> <none|max|avg> <window> <x> <y> <radius>
  unsubscribe <sid>
  neighbors
  subs
  range [metres]
  help";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Subscribe(SubscribeRequest),
    Unsubscribe(Sid),
    Neighbors,
    Subscriptions,
    Range(Option<f32>),
    Help,
}

/// Parse one line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    let cmd = match (name, args.as_slice()) {
        ("subscribe" | "sub", [sensor, period, aggr, window, x, y, radius]) => {
            Command::Subscribe(SubscribeRequest {
                sensor: sensors::by_name(sensor)
                    .with_context(|| format!("unknown sensor {:?}", sensor))?,
                period_ms: period.parse().context("period_ms")?,
                aggregation: parse_aggregation(aggr)?,
                window: window.parse().context("window")?,
                center: Position::new(x.parse().context("x")?, y.parse().context("y")?),
                radius: radius.parse().context("radius")?,
            })
        }
        ("subscribe" | "sub", _) => bail!("usage: subscribe <sensor> <period_ms> <none|max|avg> <window> <x> <y> <radius>"),
        ("unsubscribe" | "unsub", [sid]) => Command::Unsubscribe(Sid(sid.parse().context("sid")?)),
        ("neighbors", []) => Command::Neighbors,
        ("subs", []) => Command::Subscriptions,
        ("range", []) => Command::Range(None),
        ("range", [metres]) => Command::Range(Some(metres.parse().context("range")?)),
        ("help", _) => Command::Help,
        _ => bail!("unknown command {:?}; try help", line.trim()),
    };
    Ok(Some(cmd))
}

fn parse_aggregation(s: &str) -> Result<Aggregation> {
    Ok(match s {
        "none" | "0" => Aggregation::None,
        "max" | "1" => Aggregation::Max,
        "avg" | "average" | "2" => Aggregation::Average,
        other => bail!("unknown aggregation {:?}", other),
    })
}

/// Read stdin until EOF, forwarding parsed commands.
pub async fn read_commands(tx: mpsc::Sender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => return,
            Err(e) => {
                warn!("stdin: {}", e);
                return;
            }
        };
        match parse(&line) {
            Ok(Some(cmd)) => {
                if tx.send(cmd).await.is_err() {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => println!("{:#}", e),
        }
    }
}

/// Run a command against the node; returns actions for the host to perform.
pub fn execute(cmd: Command, node: &mut GeoNode, radio: &mut Radio) -> Vec<Action> {
    match cmd {
        Command::Subscribe(req) => match node.subscribe(req) {
            Ok((sid, actions)) => {
                println!("sid {}", sid);
                actions
            }
            Err(e) => {
                println!("subscribe failed: {}", e);
                Vec::new()
            }
        },
        Command::Unsubscribe(sid) => node.unsubscribe(sid).unwrap_or_else(|e| {
            println!("unsubscribe failed: {}", e);
            Vec::new()
        }),
        Command::Neighbors => {
            for n in node.neighbors().iter() {
                println!(
                    "{} at {} ({} second hop, expires {} ms)",
                    n.address,
                    n.position,
                    n.second_hop.len(),
                    n.expires_at_ms
                );
            }
            Vec::new()
        }
        Command::Subscriptions => {
            for a in node.subscriptions().iter() {
                let s = &a.subscription;
                let role = if s.owner_address == node.address() {
                    "owner"
                } else if a.sampler.is_some() {
                    "sampling"
                } else {
                    "idle"
                };
                println!(
                    "{} sensor {} every {} ms {} window {} region {} r {} ({})",
                    s.sid, s.sensor, s.period_ms, s.aggregation, s.window, s.center, s.radius, role
                );
            }
            for sid in node.subscriptions().seen() {
                println!("{} (seen)", sid);
            }
            Vec::new()
        }
        Command::Range(Some(r)) => {
            radio.set_range(r);
            println!("transmit range {}", r);
            Vec::new()
        }
        Command::Range(None) => {
            println!("transmit range {}", radio.range());
            Vec::new()
        }
        Command::Help => {
            println!("{}", HELP);
            Vec::new()
        }
    }
}
