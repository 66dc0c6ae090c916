// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use ocpp_proxy::config::{Cli, ProxyConfig};

#[tokio::main]
async fn main() {
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("fatal: failed to install rustls crypto provider: {e:?}");
        std::process::exit(1);
    }

    let cli = Cli::parse();
    let config = match ProxyConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal: {e:#}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level().as_filter_str())),
        )
        .init();

    if let Err(e) = ocpp_proxy::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
