//! Betzona betting API server.
//!
//! Serves the HTTP API over PostgreSQL, or over an in-memory store with
//! `--in-memory` for local runs.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Error;
use betzona::db::Database;
use bz_server::{
    api::{self, AppState},
    cache::ResponseCache,
    config::ServerConfig,
    logging, metrics,
};
use pico_args::Arguments;
use tracing::{error, info};

const HELP: &str = "\
Run the Betzona betting API server

USAGE:
  bz_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL or postgres://postgres@localhost/betzona]

FLAGS:
  --in-memory              Use a volatile in-memory store instead of PostgreSQL
  --skip-migrations        Do not run database migrations on startup
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  JWT_SECRET               JWT signing secret (required, >= 32 chars)
  PASSWORD_PEPPER          Password hashing pepper (required, >= 16 chars)
  JWT_DURATION_HOURS       Access token lifetime [default: 24]
  STARTING_BALANCE         Balance of new accounts [default: 0]
  ADMIN_EMAILS             Comma-separated emails registered as admins
  RATE_LIMIT_REQUESTS      Requests per IP per window [default: 100]
  RATE_LIMIT_WINDOW_SECS   Rate limit window [default: 60]
  CACHE_ENABLED            Cache bet reads [default: true]
  CACHE_TTL_SECS           Cache entry lifetime [default: 300]
  METRICS_BIND             Prometheus listener address (disabled when unset)
  RUST_LOG                 Log filter [default: info,sqlx=warn,hyper=warn]
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    in_memory: bool,
    skip_migrations: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        in_memory: pargs.contains("--in-memory"),
        skip_migrations: pargs.contains("--skip-migrations"),
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        info!("Prometheus metrics exposed on http://{}/metrics", addr);
    }

    let state = if args.in_memory {
        info!("Using in-memory store; data is lost on shutdown");
        AppState::in_memory(&config)
    } else {
        info!("Connecting to database");
        let db = Database::new(&config.database)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
        info!("Database connected successfully");

        if args.skip_migrations {
            info!("Skipping database migrations");
        } else {
            db.migrate()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
            info!("Database migrations applied");
        }
        AppState::with_database(db, &config)
    };

    if state.cache.is_enabled() {
        spawn_cache_purge(state.cache.clone(), config.cache.ttl());
    }

    let database = state.database.clone();
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");
    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

/// Drop expired cache entries once per TTL period
fn spawn_cache_purge(cache: Arc<ResponseCache>, ttl: Duration) {
    let period = ttl.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired cache entries");
            }
        }
    });
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
