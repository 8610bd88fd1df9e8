// SPDX-License-Identifier: MIT OR Apache-2.0

use std::path::PathBuf;

use clap::Parser;

use setmesh::core::config::{apply_config_overrides, load_config_file, ManagerConfig, NodeEntry};
use setmesh::core::manager::ManagerServer;

#[derive(Parser, Debug)]
#[command(about = "Run the cluster manager", author, version)]
struct Cli {
    /// Configuration file (TOML or YAML)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override config values using dot-notation (can be used multiple times)
    ///
    /// Examples:
    ///   --set broadcast.target_mode=narrow
    ///   --set catalog.path=./catalog.db
    ///   --set scan.report_partial_results=true
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Address to accept client requests on
    #[arg(long)]
    listen: Option<String>,

    /// Storage node address, in addition to those in the configuration file
    #[arg(long = "node", value_name = "HOST[:PORT]")]
    nodes: Vec<String>,
}

#[tokio::main]
async fn main() {
    // Initialize logging from RUST_LOG environment variable
    env_logger::init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load config from {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => ManagerConfig::default(),
    };

    if let Err(e) = apply_config_overrides(&mut config, &cli.overrides) {
        eprintln!("Failed to apply config overrides: {e}");
        std::process::exit(1);
    }
    if let Some(listen) = cli.listen {
        config.manager.listen = listen;
    }
    config
        .nodes
        .extend(cli.nodes.into_iter().map(|address| NodeEntry { address, name: None }));

    let server = match ManagerServer::from_config(&config) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Failed to initialize manager: {e}");
            std::process::exit(1);
        }
    };

    let handle = match server.start(&config.manager.listen).await {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to listen on {}: {e}", config.manager.listen);
            std::process::exit(1);
        }
    };

    println!(
        "Manager listening on {} with {} storage node(s). Press Ctrl+C to exit",
        handle.local_addr,
        server.handler().registry().len()
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Failed to wait for Ctrl+C: {e}");
    }
    println!("Shutting down");
    handle.shutdown();
}
