mod cli;
mod commands;
mod config;
mod formatter;

use std::process;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to build tokio runtime: {}", e);
            process::exit(1);
        }
    };

    if let Err(error) = rt.block_on(run_cli()) {
        eprintln!("Error: {:#}", error);
        process::exit(1);
    }
}

async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries container logs and command output; diagnostics go to stderr.
    let level = if cli.global.debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        cli::Commands::Serve(args) => commands::serve::execute(args, &cli.global).await,
        cli::Commands::Dispatch(args) => commands::dispatch::execute(args, &cli.global).await,
        cli::Commands::List(args) => commands::list::execute(args, &cli.global).await,
        cli::Commands::Inspect(args) => commands::inspect::execute(args, &cli.global).await,
        cli::Commands::Rm(args) => commands::rm::execute(args, &cli.global).await,
        cli::Commands::StopAll(args) => commands::stop_all::execute(args, &cli.global).await,
    }
}
