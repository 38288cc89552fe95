//! vidshelf server entry point.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidshelf::{
    config::{Cli, Command, Config, StorageBackend},
    db::{self, Database},
    engine::{Engine, EngineOptions},
    fs::{LocalFs, NoopNotifier},
    server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    // Handle command
    match cli.command {
        Some(Command::Init { force }) => cmd_init(force).await,
        Some(Command::Scan { roots }) => cmd_scan(config, roots).await,
        Some(Command::Search { query, roots }) => cmd_search(config, query, roots).await,
        Some(Command::Serve { bind, roots }) => cmd_serve(config, bind, roots).await,
        None => {
            // Default: start server
            cmd_serve(config, None, Vec::new()).await
        }
    }
}

fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize config and storage.
async fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    // Write default config
    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    // Initialize storage
    let config = Config::default();
    match config.storage.backend {
        StorageBackend::Sqlite => {
            let _db = Database::open(&config.storage.path)?;
            println!("Initialized database: {}", config.storage.path.display());
        }
        StorageBackend::Json => {
            std::fs::create_dir_all(&config.storage.path)?;
            println!("Initialized storage: {}", config.storage.path.display());
        }
    }

    println!("\nAdd your video folders to [library] roots in config.toml.");
    println!("Then run: vidshelf serve");

    Ok(())
}

/// Engine for one-shot commands: no watcher.
fn offline_engine(config: &Config) -> anyhow::Result<Engine> {
    Ok(Engine::new(
        EngineOptions::from_config(config),
        Arc::new(LocalFs),
        Arc::new(NoopNotifier),
        db::open_store(&config.storage)?,
    ))
}

/// Scan folders and print statistics.
async fn cmd_scan(config: Config, roots: Vec<PathBuf>) -> anyhow::Result<()> {
    init_logging("vidshelf=warn");

    let mut engine = offline_engine(&config)?;
    let summary = engine.scan_library(&roots)?;
    let stats = engine.stats();
    let watch = engine.watch_stats();

    println!(
        "Indexed {} files ({} rejected, {} unreadable entries skipped)",
        summary.indexed, summary.rejected, summary.skipped
    );
    println!("{:<16} {}", "Movies", stats.total_movies);
    println!("{:<16} {}", "Series", stats.total_series);
    println!("{:<16} {}", "Episodes", stats.total_episodes);
    println!("{:<16} {} bytes", "Total size", stats.total_size);
    println!("{:<16} {}", "Watched", watch.watched_items);
    println!("{:<16} {}", "In progress", watch.in_progress_items);

    Ok(())
}

/// Scan folders and run a search.
async fn cmd_search(config: Config, query: String, roots: Vec<PathBuf>) -> anyhow::Result<()> {
    init_logging("vidshelf=warn");

    let roots = if roots.is_empty() {
        config.library.roots.clone()
    } else {
        roots
    };
    if roots.is_empty() {
        anyhow::bail!("No library roots. Pass --root or set [library] roots in the config file.");
    }

    let mut engine = offline_engine(&config)?;
    engine.scan_library(&roots)?;

    let hits = engine.search(&query);
    if hits.is_empty() {
        println!("No matches for \"{}\".", query);
        return Ok(());
    }

    println!("{:<6} {:<40} PATH", "SCORE", "TITLE");
    println!("{}", "-".repeat(80));
    for hit in hits {
        let title = match hit.item.series_name() {
            Some(series) => format!("{} ({})", hit.item.title, series),
            None => hit.item.title.clone(),
        };
        println!("{:<6.3} {:<40} {}", hit.score, title, hit.item.path.display());
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(
    mut config: Config,
    bind: Option<std::net::SocketAddr>,
    roots: Vec<PathBuf>,
) -> anyhow::Result<()> {
    // Override bind address and roots if specified
    if let Some(addr) = bind {
        config.server.bind = addr;
    }
    if !roots.is_empty() {
        config.library.roots = roots;
    }

    init_logging("vidshelf=info,tower_http=info");

    tracing::info!(
        bind = %config.server.bind,
        storage = %config.storage.path.display(),
        roots = ?config.library.roots,
        "Starting vidshelf server"
    );

    let engine = Engine::from_config(&config)?;
    let state = server::AppState::new(config.clone(), engine);

    // Live updates are applied as soon as the first scan subscribes
    state.spawn_event_pump();

    if state.roots().is_empty() {
        tracing::warn!(
            "No library roots configured. Add them to [library] roots or pass --root <path>"
        );
    } else {
        tracing::info!("Starting background library scan...");
        state.start_background_scan();
    }

    // Start background rescan task if enabled
    if config.scan.interval_seconds > 0 && !state.roots().is_empty() {
        let state_clone = state.clone();
        let interval = Duration::from_secs(config.scan.interval_seconds);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // Skip first immediate tick

            loop {
                ticker.tick().await;
                tracing::debug!("Running scheduled library rescan");

                let scan_state = state_clone.clone();
                match tokio::task::spawn_blocking(move || scan_state.scan_all_libraries()).await {
                    Ok(Err(e)) => tracing::warn!(error = %e, "Scheduled rescan failed"),
                    Err(e) => tracing::warn!(error = %e, "Scheduled rescan panicked"),
                    Ok(Ok(_)) => {}
                }
            }
        });
    }

    // Create router
    let app = server::create_router(state.clone());

    // Start server IMMEDIATELY (don't wait for scan)
    let listener = TcpListener::bind(config.server.bind).await?;
    tracing::info!(address = %config.server.bind, "Server listening (background scan in progress)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
            state.shutdown();
        })
        .await?;

    Ok(())
}
