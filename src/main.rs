// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use qrlink::constants::endpoint::DEFAULT_BIND;
use std::net::SocketAddr;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "qrlink")]
#[command(about = "Scan QR codes from a camera and send each new one to a server")]
#[command(version = qrlink::constants::app_info::version())]
#[command(subcommand_required = false)]
struct Cli {
    /// Config file (default: ~/.config/qrlink/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan continuously (default). Reads start/stop/hide/show/quit from stdin
    Scan(cli::ScanOptions),

    /// List available cameras
    List {
        /// Backend to enumerate (pipewire or v4l2)
        #[arg(short, long)]
        backend: Option<String>,
    },

    /// Decode a QR code from an image file
    Decode {
        /// Image to decode
        image: PathBuf,
    },

    /// Run the reference receiver
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = DEFAULT_BIND)]
        bind: SocketAddr,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=qrlink=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Some(Commands::Scan(options)) => cli::scan(config_path, options),
        Some(Commands::List { backend }) => cli::list_cameras(config_path, backend.as_deref()),
        Some(Commands::Decode { image }) => cli::decode_image(&image),
        Some(Commands::Serve { bind }) => cli::serve(bind),
        None => cli::scan(config_path, cli::ScanOptions::default()),
    }
}
