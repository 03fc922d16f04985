//! Command-line interface: four positional arguments, no config file, no
//! environment-variable layer.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(author = "Krakaw")]
#[command(version = "1.0.0")]
#[command(about = "WebSocket publish/subscribe relay server", long_about = None)]
pub struct Cli {
    /// Address to bind the listener to
    pub address: IpAddr,

    /// Port to bind the listener to
    pub port: u16,

    /// Number of worker threads in the async runtime
    pub threads: usize,

    /// Keep-alive ping interval, in milliseconds
    pub ping_duration_ms: u64,
}

impl Cli {
    /// Number of runtime worker threads, clamped to a minimum of 1.
    pub fn threads(&self) -> usize {
        self.threads.max(1)
    }

    /// Keep-alive ping interval, clamped to a minimum of 1ms.
    pub fn ping_duration(&self) -> Duration {
        Duration::from_millis(self.ping_duration_ms.max(1))
    }

    /// Validates and clamps the raw arguments into the typed config the
    /// listener is actually constructed from.
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            addr: SocketAddr::new(self.address, self.port),
            threads: self.threads(),
            ping_duration: self.ping_duration(),
        }
    }
}

/// The validated, clamped configuration a [`crate::server`] listener is
/// built from. The CLI is this crate's only configuration surface: no file,
/// no environment layer, no hot-reload.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub threads: usize,
    pub ping_duration: Duration,
}
