// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use tapd::config::Config;

#[derive(Parser)]
#[command(name = "tapd", version, about = "Physical-media control daemon.")]
struct Cli {
    #[command(flatten)]
    config: Config,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = cli.config;

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&config);

    if let Err(e) = tapd::service::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
