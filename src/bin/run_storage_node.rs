// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use clap::Parser;

use setmesh::core::distributed::{TcpTransport, TcpTransportConfig};
use setmesh::core::storage::StorageNode;

#[derive(Parser, Debug)]
#[command(about = "Run an in-memory storage node", author, version)]
struct Cli {
    /// Address to accept manager connections on
    #[arg(long, default_value = "0.0.0.0:8108")]
    listen: String,

    /// Node name used in logs
    #[arg(long)]
    name: Option<String>,

    /// Largest frame accepted, in bytes
    #[arg(long)]
    max_message_size: Option<usize>,
}

#[tokio::main]
async fn main() {
    // Initialize logging from RUST_LOG environment variable
    env_logger::init();

    let cli = Cli::parse();

    let mut transport_config = TcpTransportConfig::default();
    if let Some(size) = cli.max_message_size {
        transport_config.max_message_size = size;
    }
    let name = cli.name.unwrap_or_else(|| cli.listen.clone());
    let node = StorageNode::new(name, Arc::new(TcpTransport::with_config(transport_config)));

    let handle = match node.start(&cli.listen).await {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to listen on {}: {e}", cli.listen);
            std::process::exit(1);
        }
    };
    println!(
        "Storage node '{}' listening on {}. Press Ctrl+C to exit",
        node.name(),
        handle.local_addr
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Failed to wait for Ctrl+C: {e}");
    }
    println!("Shutting down");
    handle.shutdown();
}
