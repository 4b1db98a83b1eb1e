//! redis-inventory - Sampled Memory Inventory of a Redis Keyspace
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use redis_inventory::config::{CliArgs, Command, InventoryConfig, OutputFormat, RedisUrl};
use redis_inventory::progress::{print_header, print_summary, ProgressReporter};
use redis_inventory::report::{render_json, render_text, RenderOptions};
use redis_inventory::scanner::{KeyScanService, Scanner};
use redis_inventory::seed::{default_catalogue, Seeder};
use redis_inventory::store::RedisExecutor;
use redis_inventory::trie::{Param, Trie};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    // Ctrl+C cancels the scan; a second one exits
    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            eprintln!("\nForce shutdown!");
            std::process::exit(130);
        }
        eprintln!("\nInterrupt received, finishing with partial results...");
        handler_token.cancel();
    })
    .context("Failed to set signal handler")?;

    runtime.block_on(async {
        match &args.command {
            Command::Inventory { .. } => {
                let config = InventoryConfig::from_args(&args).context("Invalid configuration")?;
                run_inventory(config, token).await
            }
            Command::Seed { addr, cycles } => {
                let url = RedisUrl::parse(addr).context("Invalid configuration")?;
                run_seed(&url, *cycles, token).await?;
                Ok(ExitCode::SUCCESS)
            }
        }
    })
}

async fn run_inventory(config: InventoryConfig, token: CancellationToken) -> Result<ExitCode> {
    let executor = RedisExecutor::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;

    if config.show_progress {
        print_header(executor.url(), &config.scan);
    }

    let progress = if config.show_progress {
        ProgressReporter::new()
    } else {
        ProgressReporter::hidden()
    };

    let scanner = Scanner::new(KeyScanService::new(Arc::new(executor)), progress);
    let mut trie = Trie::with_separators(&config.separators);
    let report = scanner.scan(&config.scan, &mut trie, token).await;

    let mut stdout = std::io::stdout().lock();
    match config.output {
        OutputFormat::Text => {
            let options = RenderOptions {
                max_depth: config.max_depth,
                min_size: config.min_size,
                sort_by: Param::BytesSize,
            };
            render_text(&mut stdout, &trie, &options).context("Failed to write report")?;
            print_summary(&report, &trie);
        }
        OutputFormat::Json => {
            render_json(&mut stdout, &report, &trie).context("Failed to write report")?;
        }
    }

    if report.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(completion = ?report.completion, "Inventory is partial, check logs");
        Ok(ExitCode::FAILURE)
    }
}

async fn run_seed(url: &RedisUrl, cycles: usize, token: CancellationToken) -> Result<()> {
    let executor = RedisExecutor::connect(url)
        .await
        .context("Failed to connect to Redis")?;
    info!(url = %executor.url(), cycles, "Filling Redis with random data");

    let seeder = Seeder::new(Arc::new(executor));
    let mut rng = StdRng::from_entropy();
    let written = seeder
        .seed(&mut rng, &default_catalogue(), cycles, &token)
        .await
        .context("Seeding failed")?;

    println!("Wrote {} keys", written);
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("redis_inventory=debug,warn")
    } else {
        EnvFilter::new("redis_inventory=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
