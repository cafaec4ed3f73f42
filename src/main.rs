//! Dredge worker entry point
//!
//! Runs the scrape/crawl engine as a long-lived worker process. Exit
//! codes: 0 normal shutdown, 1 configuration error, 2 fatal dependency
//! unavailable. A termination signal drains in-flight work before exit.

use clap::Parser;
use dredge::config::load_config_with_hash;
use dredge::ScrapeService;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Dredge: web scraping and crawling service worker
#[derive(Parser, Debug)]
#[command(name = "dredge")]
#[command(version)]
#[command(about = "Web scraping and crawling service worker", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would run without starting workers
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((config, hash)) => {
            tracing::info!("Configuration loaded (hash: {})", hash);
            (config, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return ExitCode::from(1);
        }
    };

    if cli.dry_run {
        print_dry_run(&config, &config_hash);
        return ExitCode::SUCCESS;
    }

    let service = match ScrapeService::new(config) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to start service: {}", e);
            return ExitCode::from(2);
        }
    };

    if !service.dependencies_healthy().await {
        tracing::error!("Browser sidecar is configured but not reachable");
        return ExitCode::from(2);
    }

    tracing::info!("Dredge worker running; press Ctrl-C to drain and exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Termination signal received");
        }
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    service.shutdown().await;
    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}

/// Sets up the tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("dredge=info,warn"),
            1 => EnvFilter::new("dredge=debug,info"),
            2 => EnvFilter::new("dredge=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Prints the effective configuration without starting anything
fn print_dry_run(config: &dredge::config::Config, hash: &str) {
    println!("=== Dredge Dry Run ===\n");
    println!("Config hash: {hash}\n");

    println!("Service:");
    println!("  Workers: {}", config.service.workers);
    println!("  Global in-flight cap: {}", config.service.global_in_flight);
    println!(
        "  Per-tenant concurrency: {}",
        config.service.per_tenant_concurrency
    );
    println!(
        "  Per-crawl concurrency: {}",
        config.service.per_crawl_concurrency
    );

    println!("\nFetch:");
    println!("  User agent: {}", config.fetch.user_agent);
    println!("  Request timeout: {}ms", config.fetch.request_timeout_ms);
    if config.fetch.headless_endpoint.is_empty() {
        println!("  Headless: disabled");
    } else {
        println!(
            "  Headless: {} ({} instances)",
            config.fetch.headless_endpoint, config.fetch.browser_pool_size
        );
    }
    if config.fetch.fire_engine_endpoint.is_empty() {
        println!("  Fire engine: disabled");
    } else {
        println!("  Fire engine: {}", config.fetch.fire_engine_endpoint);
    }
    println!("  Proxies: {}", config.fetch.proxies.len());

    println!("\nLimits:");
    println!("  Max attempts: {}", config.limits.max_attempts);
    println!("  Backoff base: {}ms", config.limits.backoff_base_ms);
    if config.limits.crawl_timeout_secs > 0 {
        println!("  Crawl timeout: {}s", config.limits.crawl_timeout_secs);
    }

    println!("\nStorage:");
    if config.storage.database_path.is_empty() {
        println!("  Database: in-memory");
    } else {
        println!("  Database: {}", config.storage.database_path);
    }

    println!("\n✓ Configuration is valid");
}
