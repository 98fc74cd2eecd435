mod analytics;
mod app;
mod cache;
mod clock;
mod config;
mod enrich;
mod pipeline;
mod source;
mod storage;
mod ttl_cache;
mod web;

#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::time::Duration;

use crate::app::App;
use crate::config::Config;
use crate::pipeline::CycleOutcome;
use crate::source::{OpenSkyClient, StateSource};

#[derive(Parser)]
#[command(name = "flightwall")]
#[command(about = "Live aircraft telemetry around an observer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Validate { config: String },
    /// Run a single ingestion cycle and exit
    PollOnce { config: String },
    /// Run ingestion and the HTTP server until interrupted
    Run { config: String },
    /// Fetch the latest frames for specific transponder addresses
    Lookup {
        config: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::PollOnce { config } => with_runtime(|| poll_once(&config)),
        Commands::Run { config } => with_runtime(|| run(&config)),
        Commands::Lookup { config, ids } => with_runtime(|| lookup(&config, &ids)),
    }
}

fn with_runtime<F, Fut>(f: F) -> ExitCode
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ExitCode>,
{
    match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime.block_on(f()),
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load(path: &str) -> Option<Config> {
    match Config::from_file(path) {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("Config error: {}", e);
            None
        }
    }
}

fn validate(path: &str) -> ExitCode {
    let Some(config) = load(path) else {
        return ExitCode::FAILURE;
    };

    println!("Config is valid");
    match config.observer() {
        Some(observer) => println!(
            "  observer:  {:.4}, {:.4} (radius {} km)",
            observer.latitude, observer.longitude, config.ingestion.radius_km
        ),
        None => println!("  observer:  none (ingestion idles until one is set)"),
    }
    println!(
        "  polling:   every {}",
        humantime::format_duration(config.poll_interval())
    );
    println!(
        "  retention: {}",
        humantime::format_duration(Duration::from_secs(config.retention.hours * 3600))
    );
    println!(
        "  cache:     {} entries, ttl {}",
        config.cache.max_entries,
        humantime::format_duration(Duration::from_secs(config.cache.ttl_secs))
    );
    println!("  storage:   {}", config.storage.path.display());
    println!("  web:       {}", config.web.bind);
    println!(
        "  source:    {} ({})",
        config.source.base_url,
        if config.is_authenticated() {
            "authenticated"
        } else {
            "anonymous"
        }
    );
    ExitCode::SUCCESS
}

fn open_app(path: &str) -> Option<App> {
    match App::from_file(path) {
        Ok(app) => Some(app),
        Err(e) => {
            eprintln!("Startup failed: {}", e);
            None
        }
    }
}

async fn poll_once(path: &str) -> ExitCode {
    let Some(app) = open_app(path) else {
        return ExitCode::FAILURE;
    };

    match app.poll_once().await {
        Ok(CycleOutcome::Processed(count)) => {
            println!("Processed {} flights", count);
            ExitCode::SUCCESS
        }
        Ok(CycleOutcome::Skipped) => {
            println!("Skipped: no observer location configured");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Cycle failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(path: &str) -> ExitCode {
    let Some(app) = open_app(path) else {
        return ExitCode::FAILURE;
    };
    log::info!(
        "Starting flightwall (poll every {}, serving on {})",
        humantime::format_duration(app.state.config.poll_interval()),
        app.state.config.web.bind
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
        }
        log::info!("Shutdown requested");
    };

    match app.run(shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn lookup(path: &str, ids: &[String]) -> ExitCode {
    let Some(config) = load(path) else {
        return ExitCode::FAILURE;
    };
    let client = match OpenSkyClient::new(&config.source) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let batch = match client.fetch_ids(ids).await {
        Ok(batch) => batch,
        Err(e) => {
            eprintln!("Lookup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("{} of {} aircraft reporting", batch.frames.len(), ids.len());
    for frame in &batch.frames {
        let position = frame
            .position
            .map(|p| format!("{:.4}, {:.4}", p.latitude, p.longitude))
            .unwrap_or_else(|| "no position".into());
        let altitude = frame
            .baro_altitude
            .map(|m| format!("{:.0} m", m))
            .unwrap_or_else(|| "-".into());
        println!(
            "  {} {:<8} {} alt {}{}",
            frame.object_id,
            frame.callsign.as_deref().unwrap_or("-"),
            position,
            altitude,
            if frame.on_ground { " (ground)" } else { "" }
        );
    }
    ExitCode::SUCCESS
}
