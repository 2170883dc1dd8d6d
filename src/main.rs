//! Heliocast - space-weather broadcast server
//!
//! Polls telemetry snapshots, detects space-weather events and serves the
//! resulting broadcast messages to display clients over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Run with synthetic telemetry
//! cargo run --release
//!
//! # Read JSON snapshots (one per line) from stdin
//! python fetch_swpc.py | ./heliocast --stdin
//!
//! # Replay a recorded storm at 1 snapshot / 200 ms
//! ./heliocast --replay data/may-2024-storm.json --interval-ms 200
//! ```
//!
//! # Environment Variables
//!
//! - `HELIOCAST_CONFIG`: Path to a TOML config file
//! - `HELIOCAST_SERVER_ADDR`: HTTP bind address (default: 0.0.0.0:8080)
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use heliocast::api::{create_app, ApiState};
use heliocast::broadcast::BroadcastService;
use heliocast::config::HelioConfig;
use heliocast::detector::EventDetector;
use heliocast::pipeline::{
    ProcessingLoop, ReplaySource, SnapshotSource, StdinSource, SyntheticSource,
};
use heliocast::types::BroadcastMessage;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "heliocast")]
#[command(about = "Space-weather event detection and broadcast server")]
#[command(version)]
struct CliArgs {
    /// Read JSON snapshots from stdin instead of synthetic data
    #[arg(long, conflicts_with = "replay")]
    stdin: bool,

    /// Replay snapshots from a JSON array / JSON-lines file
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Delay between replayed / synthetic snapshots (ms)
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    /// Override the server address
    #[arg(short, long, env = "HELIOCAST_SERVER_ADDR")]
    addr: Option<String>,

    /// Explicit config file (skips the normal search order)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

// ============================================================================
// Supervised Tasks
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    Pipeline,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HttpServer => write!(f, "HttpServer"),
            Self::Pipeline => write!(f, "Pipeline"),
        }
    }
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: axum::Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Spawn the snapshot pipeline. It ends at EOF; the server keeps running.
fn spawn_pipeline(
    task_set: &mut JoinSet<Result<TaskName>>,
    processing: ProcessingLoop,
    mut source: Box<dyn SnapshotSource>,
) {
    task_set.spawn(async move {
        let stats = processing.run(source.as_mut()).await;
        info!(
            snapshots = stats.snapshots_processed,
            events = stats.events_detected,
            "[Pipeline] Task finished"
        );
        Ok(TaskName::Pipeline)
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring...");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let in-flight requests drain
    while task_set.join_next().await.is_some() {}
    Ok(())
}

// ============================================================================
// Wiring
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(explicit: Option<&PathBuf>) -> Result<HelioConfig> {
    match explicit {
        Some(path) => HelioConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(HelioConfig::load()),
    }
}

/// Stand-in for the speech collaborator: log messages that carry audio.
fn audio_cue_listener(message: &BroadcastMessage) -> Result<()> {
    if message.has_audio {
        info!(
            broadcast_id = %message.id,
            tone = %message.tone,
            priority = %message.priority,
            "🔊 Audio cue: {}",
            message.content
        );
    }
    Ok(())
}

fn select_source(args: &CliArgs, interval_ms: u64) -> Result<Box<dyn SnapshotSource>> {
    if let Some(path) = &args.replay {
        info!(path = %path.display(), interval_ms, "Input: replay file");
        let source = ReplaySource::from_file(path, interval_ms)?;
        Ok(Box::new(source))
    } else if args.stdin {
        info!("Input: stdin (JSON snapshots, one per line)");
        Ok(Box::new(StdinSource::stdin()))
    } else {
        info!(interval_ms, "Input: synthetic telemetry");
        Ok(Box::new(SyntheticSource::new(interval_ms)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let config = load_config(args.config.as_ref())?;
    let server_addr = args.addr.clone().unwrap_or_else(|| config.server.addr.clone());
    let interval_ms = args.interval_ms.unwrap_or(config.pipeline.snapshot_interval_ms);

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Heliocast {} - space-weather broadcast server", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        storm_kp = config.detector.min_kp_for_storm,
        high_wind = config.detector.min_speed_for_high_wind,
        compound = config.detector.detect_compound_events,
        history = config.broadcast.max_history_size,
        "Configuration loaded"
    );

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let service = BroadcastService::new(config.broadcast.clone());
    let _audio = service.subscribe(audio_cue_listener);
    service.broadcast_system(
        "Heliocast online",
        "Space-weather monitoring started.",
        None,
    );

    let source = select_source(&args, interval_ms)?;
    let processing = ProcessingLoop::new(
        EventDetector::new(config.detector.clone()),
        service.clone(),
        cancel_token.clone(),
    )
    .with_weather_updates(config.pipeline.weather_updates);

    let app = create_app(ApiState::new(service, config.api.clone()));
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", server_addr))?;
    info!("HTTP server listening on http://{}", server_addr);
    info!("Poll endpoint: http://{}/api/broadcast", server_addr);

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());
    spawn_pipeline(&mut task_set, processing, source);

    run_supervisor(&mut task_set, cancel_token).await?;

    info!("Heliocast shutdown complete");
    Ok(())
}
