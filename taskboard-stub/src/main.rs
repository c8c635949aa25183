//! `taskboard-stub`: in-memory taskboard backend for local testing.
//!
//! ```bash
//! # Listen on 127.0.0.1:8000, accept any token
//! cargo run --bin taskboard-stub
//!
//! # Custom address, only tokens listed in the config file
//! cargo run --bin taskboard-stub -- --bind 0.0.0.0:9100 --require-auth -c stub.toml
//! ```

use std::sync::Arc;

use clap::Parser;
use taskboard_stub::config::{StubCliArgs, StubConfig};
use taskboard_stub::server::{self, StubState};

#[tokio::main]
async fn main() {
    let cli = StubCliArgs::parse();

    let config = match StubConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(
        addr = %config.bind_addr,
        users = config.users.len(),
        require_auth = config.require_auth,
        "starting taskboard stub"
    );

    let state = Arc::new(
        StubState::new()
            .with_users(config.users)
            .requiring_auth(config.require_auth),
    );

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "stub listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "stub server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start stub server");
            std::process::exit(1);
        }
    }
}
