//! RoutineOS: daily routine notification server.
//!
//! Subcommands:
//! - `serve`: HTTP trigger surface, SSE streaming, push dispatch
//! - `check`: run one push window and print the report

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand};
use miette::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use routineos_core::{BroadcastHub, DedupStore, TimerService, WeeklySchedule};
use routineos_push::{CRON_WINDOW_SECS, Dispatcher, Engine, PushClient, SubscriptionStore};
use routineos_web::{AppState, create_router, run_stream_alerts};

#[derive(Parser)]
#[command(name = "routineos")]
#[command(about = "Daily routine notification server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the notification server
    Serve {
        /// HTTP server port
        #[arg(long, default_value = "3000", env = "ROUTINEOS_PORT")]
        port: u16,

        /// Weekly schedule JSON file
        #[arg(long, default_value = "data/schedule.json", env = "ROUTINEOS_SCHEDULE")]
        schedule: PathBuf,

        /// Subscription storage file
        #[arg(
            long,
            default_value = "data/subscriptions.json",
            env = "ROUTINEOS_SUBSCRIPTIONS"
        )]
        subscriptions: PathBuf,

        /// Shared secret for the authenticated periodic trigger
        #[arg(long, env = "ROUTINEOS_CRON_SECRET")]
        cron_secret: Option<String>,

        /// Bearer credential presented to the push provider
        #[arg(long, env = "ROUTINEOS_PUSH_TOKEN")]
        push_token: Option<String>,

        /// Public push key exposed to registering clients
        #[arg(long, env = "ROUTINEOS_PUSH_PUBLIC_KEY")]
        push_public_key: Option<String>,

        /// Streaming alert check interval in seconds (0 disables the loop)
        #[arg(long, default_value = "1")]
        stream_tick: u64,

        /// Push delivery timeout in seconds
        #[arg(long, default_value = "10")]
        push_timeout: u64,
    },

    /// Run one push window now and print the report
    Check {
        /// Weekly schedule JSON file
        #[arg(long, default_value = "data/schedule.json", env = "ROUTINEOS_SCHEDULE")]
        schedule: PathBuf,

        /// Subscription storage file
        #[arg(
            long,
            default_value = "data/subscriptions.json",
            env = "ROUTINEOS_SUBSCRIPTIONS"
        )]
        subscriptions: PathBuf,

        /// Bearer credential presented to the push provider
        #[arg(long, env = "ROUTINEOS_PUSH_TOKEN")]
        push_token: Option<String>,

        /// Push delivery timeout in seconds
        #[arg(long, default_value = "10")]
        push_timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "routineos=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            schedule,
            subscriptions,
            cron_secret,
            push_token,
            push_public_key,
            stream_tick,
            push_timeout,
        } => {
            serve(
                port,
                schedule,
                subscriptions,
                cron_secret,
                push_token,
                push_public_key,
                stream_tick,
                push_timeout,
            )
            .await
        }

        Commands::Check {
            schedule,
            subscriptions,
            push_token,
            push_timeout,
        } => check(schedule, subscriptions, push_token, push_timeout).await,
    }
}

struct Components {
    schedule: Arc<WeeklySchedule>,
    store: Arc<SubscriptionStore>,
    hub: Arc<BroadcastHub>,
    dedup: Arc<DedupStore>,
    engine: Arc<Engine>,
}

async fn build_components(
    schedule_path: PathBuf,
    subscriptions_path: PathBuf,
    push_token: Option<String>,
    push_timeout: u64,
) -> Result<Components> {
    let schedule = Arc::new(
        WeeklySchedule::load(&schedule_path)
            .await
            .map_err(|e| miette::miette!("failed to load schedule: {}", e))?,
    );
    info!(
        path = %schedule_path.display(),
        items = schedule.len(),
        "loaded weekly schedule"
    );

    let store = Arc::new(
        SubscriptionStore::open(subscriptions_path)
            .await
            .map_err(|e| miette::miette!("failed to open subscription store: {}", e))?,
    );

    let hub = Arc::new(BroadcastHub::new());
    let dedup = Arc::new(DedupStore::default());
    let client = PushClient::new(push_token, Duration::from_secs(push_timeout))
        .map_err(|e| miette::miette!("failed to build push client: {}", e))?;
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), client, hub.clone()));
    let engine = Arc::new(Engine::new(
        schedule.clone(),
        dedup.clone(),
        dispatcher,
        hub.clone(),
    ));

    Ok(Components {
        schedule,
        store,
        hub,
        dedup,
        engine,
    })
}

#[allow(clippy::too_many_arguments)]
async fn serve(
    port: u16,
    schedule_path: PathBuf,
    subscriptions_path: PathBuf,
    cron_secret: Option<String>,
    push_token: Option<String>,
    push_public_key: Option<String>,
    stream_tick: u64,
    push_timeout: u64,
) -> Result<()> {
    let components =
        build_components(schedule_path, subscriptions_path, push_token, push_timeout).await?;

    // Streaming alert loop
    if stream_tick > 0 {
        let engine = components.engine.clone();
        tokio::spawn(async move {
            run_stream_alerts(engine, Duration::from_secs(stream_tick)).await;
        });
    }

    // Reclaim expired dedup entries in the background
    {
        let dedup = components.dedup.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                dedup.sweep(chrono::Utc::now());
            }
        });
    }

    let timers = Arc::new(TimerService::new(components.hub.clone()));
    let router = create_router(Arc::new(AppState {
        engine: components.engine,
        schedule: components.schedule,
        store: components.store,
        hub: components.hub,
        timers,
        cron_secret,
        push_public_key,
    }));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .map_err(|e| miette::miette!("failed to bind port {}: {}", port, e))?;
    info!(port, "routineos listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| miette::miette!("server error: {}", e))?;

    info!("routineos shut down gracefully");
    Ok(())
}

async fn check(
    schedule_path: PathBuf,
    subscriptions_path: PathBuf,
    push_token: Option<String>,
    push_timeout: u64,
) -> Result<()> {
    let components =
        build_components(schedule_path, subscriptions_path, push_token, push_timeout).await?;

    let summary = components
        .engine
        .run_push_window(Local::now(), CRON_WINDOW_SECS)
        .await
        .map_err(|e| miette::miette!("push window failed: {}", e))?;

    let report = serde_json::to_string_pretty(&summary)
        .map_err(|e| miette::miette!("failed to render report: {}", e))?;
    println!("{report}");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
