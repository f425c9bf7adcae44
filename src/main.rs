mod config;
mod db;
mod dhcp;
mod dns;
mod error;
mod handlers;
mod models;
mod reconcile;
mod router;
mod scheduler;
mod utils;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use db::Store;
use reconcile::Reconciler;
use scheduler::PassScheduler;

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub reconciler: Arc<Reconciler>,
}

#[derive(Debug, Parser)]
#[command(name = "clientparser", version, about = "Reconcile DHCP leases and DNS records into a client inventory")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one reconciliation pass and print its summary
    Run,
    /// Serve the HTTP API, with optional scheduled passes
    Serve,
    /// List clients in the inventory
    List {
        /// Include retired clients
        #[arg(long)]
        all: bool,
    },
    /// Show recent reconciliation runs
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: i32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clientparser=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli.command.unwrap_or(Command::Run)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let cfg = Config::load();
    let store = Store::with_pool_size(&cfg.database_uri, cfg.db_max_connections).await?;
    tracing::info!("Database initialized: {} (pool_size={})", cfg.database_uri, cfg.db_max_connections);

    match command {
        Command::Run => {
            let reconciler = build_reconciler(&cfg, store)?;
            let summary = reconciler.run_pass(&cfg.pass_settings()?).await?;
            println!("{}: {}", summary.run_id, summary);
        }
        Command::Serve => serve(cfg, store).await?,
        Command::List { all } => {
            for client in store.list_clients(all, i32::MAX, 0).await? {
                let record = &client.record;
                println!(
                    "{}  {:<15}  {:<24}  {:<11}  {}{}",
                    record.mac,
                    record.ip,
                    record.hostname.as_deref().unwrap_or("-"),
                    record.lease_kind.as_str(),
                    client.last_seen_at.to_rfc3339(),
                    if client.retired { "  (retired)" } else { "" }
                );
            }
        }
        Command::Runs { limit } => {
            for run in store.list_runs(limit).await? {
                match &run.error {
                    Some(error) => println!(
                        "{}  {}  {}  {} phase: {}",
                        run.started_at.to_rfc3339(),
                        run.id,
                        run.status,
                        run.phase.as_deref().unwrap_or("-"),
                        error
                    ),
                    None => println!(
                        "{}  {}  {}  +{} ~{} -{} skipped {}",
                        run.started_at.to_rfc3339(),
                        run.id,
                        run.status,
                        run.inserted,
                        run.updated,
                        run.retired,
                        run.skipped
                    ),
                }
            }
        }
    }
    Ok(())
}

fn build_reconciler(cfg: &Config, store: Store) -> anyhow::Result<Reconciler> {
    cfg.validate().context("Invalid configuration")?;
    let dhcp = dhcp::build_source(cfg)?;
    let dns = dns::build_source(cfg);
    tracing::info!(
        "DHCP backend: {}, DNS: {}",
        cfg.dhcp_backend,
        if dns.is_some() { cfg.dns_server.as_str() } else { "disabled" }
    );
    Ok(Reconciler::new(store, dhcp, dns))
}

async fn serve(cfg: Config, store: Store) -> anyhow::Result<()> {
    let reconciler = Arc::new(build_reconciler(&cfg, store.clone())?);

    let mut scheduler = None;
    if cfg.reconcile_interval_secs > 0 {
        let mut pass_scheduler =
            PassScheduler::new(reconciler.clone(), cfg.pass_settings()?, cfg.reconcile_interval_secs);
        pass_scheduler.start();
        tracing::info!("Scheduled passes every {}s", cfg.reconcile_interval_secs);
        scheduler = Some(pass_scheduler);
    }

    let state = Arc::new(AppState {
        store,
        config: cfg.clone(),
        reconciler,
    });

    // Build router
    let app = router::build(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    tracing::info!("ClientParser listening on {}", cfg.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(mut scheduler) = scheduler {
        scheduler.stop();
    }
    tracing::info!("ClientParser shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
