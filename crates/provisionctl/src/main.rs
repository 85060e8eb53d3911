//! provisionctl - operator CLI for the provisioning udev helpers.
//!
//! Thin clap front-end over `provision_common`; install scripts use it to
//! query device properties, wait for udev, and emit naming rules.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;

#[derive(Parser)]
#[command(name = "provisionctl")]
#[command(about = "udev mediation helpers for installers", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (shows parser fallback recovery)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query udev properties of a device and print them as JSON
    Info {
        /// Device path, either /dev or /sys
        path: String,
    },

    /// Wait for the udev event queue to empty
    Settle {
        /// Stop waiting once this path exists (skips entirely if present)
        #[arg(long)]
        exists: Option<String>,

        /// Maximum seconds to wait
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Trigger device events, then settle
    Trigger {
        /// Devices to trigger; all devices when omitted
        devices: Vec<String>,
    },

    /// Generate a persistent-naming udev rule for a network interface
    NetRule {
        /// Interface name to pin, e.g. eth0
        interface: String,

        /// Hardware (MAC) address to match, e.g. ff:ee:dd:cc:bb:aa
        mac: String,

        /// Write the rule to this file instead of stdout
        #[arg(long)]
        output: Option<String>,
    },

    /// List the capability flags of this build
    Features,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info { path } => commands::info(&path),
        Commands::Settle { exists, timeout } => commands::settle(exists, timeout),
        Commands::Trigger { devices } => commands::trigger(devices),
        Commands::NetRule {
            interface,
            mac,
            output,
        } => commands::net_rule(&interface, &mac, output.as_deref()),
        Commands::Features => commands::features(),
    }
}
