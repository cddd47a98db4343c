//! CoVim relay server.
//!
//! Holds the authoritative copy of one document and relays edits and cursor
//! motion between every connected editor.
//!
//! Run:
//!   cargo run -p covim-server -- --port 8555
//!   cargo run -p covim-server -- --port 8555 --buffer notes.txt

mod document;
mod server;

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "covim-server", about = "Relay server for CoVim collaborative editing")]
struct Args {
    /// Port to listen on.
    #[arg(short, long, env = "COVIM_PORT", default_value_t = 8555)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// File to seed the document with.
    #[arg(long)]
    buffer: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("covim_server=info".parse()?))
        .init();

    let args = Args::parse();
    let lines: Vec<String> = match &args.buffer {
        Some(path) => std::fs::read_to_string(path)?
            .lines()
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };

    let addr = SocketAddr::new(args.host, args.port);
    tracing::info!("Starting CoVim server on {} ({} lines)", addr, lines.len());

    server::run(addr, lines).await
}
