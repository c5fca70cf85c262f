// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use bridged::config::Config;
use bridged::run;

#[tokio::main]
async fn main() {
    let mut config = Config::parse();

    if let Err(e) = config.apply_file_overrides() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    run::init_tracing(&config);

    if let Err(e) = run::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
