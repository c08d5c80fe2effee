use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::state::Keepalive;

/// Command line flags. Every setting is optional here so that only flags
/// actually passed override the TOML file and environment.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "lockstep-server", version, about = "Playback synchronization relay")]
pub struct Cli {
    /// Port to listen on
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./lockstep.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_logs: Option<bool>,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,

    /// Path of the relay WebSocket endpoint
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_path: Option<String>,

    /// Seconds between server keepalive pings (0 disables keepalive)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive_interval_secs: Option<u64>,

    /// Seconds to wait for a pong before dropping the connection (0 disables keepalive)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive_timeout_secs: Option<u64>,

    /// Maximum members per room (unlimited when unset or 0)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_room_size: Option<usize>,
}

/// Resolved relay configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    pub ws_path: String,
    pub keepalive_interval_secs: u64,
    pub keepalive_timeout_secs: u64,
    pub max_room_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            ws_path: "/ws".to_string(),
            keepalive_interval_secs: 30,
            keepalive_timeout_secs: 10,
            max_room_size: None,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (LOCKSTEP_*) < CLI args
    pub fn load(cli: &Cli) -> Result<Self, figment::Error> {
        Self::figment(cli).extract()
    }

    pub fn figment(cli: &Cli) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("LOCKSTEP_"))
            .merge(Serialized::defaults(cli))
    }

    /// Keepalive policy, or `None` when either knob is zero.
    pub fn keepalive(&self) -> Option<Keepalive> {
        if self.keepalive_interval_secs == 0 || self.keepalive_timeout_secs == 0 {
            return None;
        }
        Some(Keepalive {
            interval: Duration::from_secs(self.keepalive_interval_secs),
            timeout: Duration::from_secs(self.keepalive_timeout_secs),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# lockstep relay configuration
# Place this file at ./lockstep.toml or specify with --config <path>
# All settings can be overridden via environment variables (LOCKSTEP_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Path of the relay WebSocket endpoint
# ws_path = "/ws"

# ---- Keepalive ----
# The server pings every client and drops connections whose pong does not
# arrive in time. Set either value to 0 to disable.
# keepalive_interval_secs = 30
# keepalive_timeout_secs = 10

# ---- Rooms ----
# Maximum members per room. Joins beyond the cap are ignored.
# Unset or 0 means unlimited.
# max_room_size = 16
"#
    .to_string()
}
