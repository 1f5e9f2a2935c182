//! Local device simulator
//!
//! Accepts bridge connections, applies every received line to its own
//! attribute state and prints that state. Runs until Ctrl+C or SIGTERM.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::*;
use futures::StreamExt;
use ircon_bridge::{Attribute, AttributeCodec, UNKNOWN};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

/// Attribute state as the simulated device sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    attributes: BTreeMap<String, String>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            attributes: Attribute::ALL
                .iter()
                .map(|attr| (attr.as_str().to_string(), UNKNOWN.to_string()))
                .collect(),
        }
    }
}

impl DeviceState {
    /// Apply one received line; returns how many tokens were applied
    pub fn apply(&mut self, line: &str) -> usize {
        let tokens = AttributeCodec::parse_line(line);
        for (name, value) in &tokens {
            self.attributes.insert((*name).to_string(), (*value).to_string());
        }
        tokens.len()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    fn render(&self) -> String {
        self.attributes
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub async fn run(addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let state = Arc::new(Mutex::new(DeviceState::default()));

    println!(
        "{} Simulated device listening on {}",
        "READY".bright_green(),
        addr.to_string().bold()
    );

    let accept_loop = async {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    info!("Bridge connected from {}", peer);
                    tokio::spawn(serve(stream, peer, Arc::clone(&state)));
                },
                Err(e) => warn!("Accept failed: {}", e),
            }
        }
    };

    tokio::select! {
        _ = accept_loop => {},
        signal = common::wait_for_shutdown() => {
            println!("{} {}, stopping simulator", "STOP".yellow(), signal);
        },
    }
    Ok(())
}

async fn serve(stream: TcpStream, peer: SocketAddr, state: Arc<Mutex<DeviceState>>) {
    let mut lines = FramedRead::new(stream, LinesCodec::new());
    while let Some(frame) = lines.next().await {
        match frame {
            Ok(line) => {
                debug!("{} -> {:?}", peer, line);
                let rendered = {
                    let mut state = state.lock();
                    state.apply(&line);
                    state.render()
                };
                println!("{} {}", peer.to_string().bright_cyan(), rendered);
            },
            Err(e) => {
                warn!("Read from {} failed: {}", peer, e);
                break;
            },
        }
    }
    info!("Bridge {} disconnected", peer);
}
