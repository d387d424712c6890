//! Process configuration, from flags or environment.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// Command-line and environment configuration for the `itembox` binary.
#[derive(Clone, Debug, Parser)]
#[command(name = "itembox", version, about = "In-memory item resource server")]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "ITEMBOX_ADDR", default_value = "0.0.0.0:8080")]
    pub addr: SocketAddr,

    /// Default log filter; `RUST_LOG` takes precedence when set.
    #[arg(long, env = "ITEMBOX_LOG", default_value = "info")]
    pub log_level: String,

    /// Start with a few sample items in the store.
    #[arg(long, env = "ITEMBOX_SEED")]
    pub seed: bool,

    /// Seconds a client has to send a request's headers.
    #[arg(long, env = "ITEMBOX_READ_TIMEOUT_SECS", default_value_t = 15)]
    pub read_timeout_secs: u64,

    /// Seconds a request may take from dispatch to response.
    #[arg(long, env = "ITEMBOX_REQUEST_TIMEOUT_SECS", default_value_t = 15)]
    pub request_timeout_secs: u64,

    /// Seconds a keep-alive connection may sit without a request.
    #[arg(long, env = "ITEMBOX_IDLE_TIMEOUT_SECS", default_value_t = 60)]
    pub idle_timeout_secs: u64,
}

impl Config {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
