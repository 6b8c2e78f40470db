use std::collections::VecDeque;
use std::env;
use std::process::exit;
use std::sync::Arc;

use anyhow::Result;
use futures_util::future::join_all;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::{select, spawn};
use tracing::{info, subscriber, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;
mod connection;
mod interests;
mod matcher;
mod pool;
mod protocol;
mod registry;
mod session;
mod state;
mod transport;

use config::ServerConfig;
use connection::handle_connection;
use state::ServerState;

const DEFAULT_CONFIG_PATH: &str = "strangerlink.toml";

fn print_usage(arg0: &str) {
    println!();
    println!("usage: {arg0} [CONFIG FILE]");
    println!("  (defaults to {DEFAULT_CONFIG_PATH} if omitted)");
}

fn init_tracing(config: &ServerConfig) -> Result<()> {
    let max_level = if cfg!(debug_assertions) || config.trace {
        Level::TRACE
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(max_level.to_string()));
    let sub = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(config.dev_mode)
        .finish();
    subscriber::set_global_default(sub)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("strangerlink {}", env!("CARGO_PKG_VERSION"));

    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        print_usage(&args[0]);
        exit(1);
    }
    let config_path = args.get(1).map(String::as_str).unwrap_or(DEFAULT_CONFIG_PATH);

    let config = config::load(config_path)?;
    init_tracing(&config)?;

    // handle ctrl-c
    let (running_tx, mut running_rx) = watch::channel(true);
    ctrlc::set_handler(move || {
        running_tx.send_if_modified(|running| {
            if *running {
                info!("Stopping ...");
                *running = false;
                true
            } else {
                false
            }
        });
    })?;

    // bind and listen for connections
    let mut listeners = Vec::new();
    for addr in &config.host {
        let listener = TcpListener::bind((addr.as_str(), config.port)).await?;
        info!("listening on {}:{} ...", addr, config.port);
        listeners.push(listener);
    }

    let state = Arc::new(ServerState::new(config));

    let mut handles = VecDeque::new();
    loop {
        let futures: FuturesUnordered<_> = listeners.iter().map(|l| l.accept()).collect();
        select! {
            result = futures.next() => {
                match result.unwrap() {
                    Ok((stream, addr)) => {
                        handles.push_back(spawn(handle_connection(
                            state.clone(),
                            stream,
                            addr,
                            running_rx.clone(),
                        )));
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to accept connection"),
                }
            }
            result = running_rx.changed() => {
                join_all(handles).await;
                info!("Stopped.");
                break Ok(result?);
            }
        }
    }
}
