//! Reclaim - a campus lost & found service that reconnects owners with
//! finders.
//!
//! # API Endpoints
//!
//! - `POST /items` - File a lost or found report (triggers the match scan)
//! - `GET /items` - The report feed
//! - `PATCH /items` - Owner marks a report resolved
//! - `DELETE /items/:id` - Owner deletes a report
//! - `POST /alerts` - File a finder's claim (notifies the owner)
//! - `GET /alerts/:id` - Claim view behind the emailed verification link
//! - `POST /alerts/:id/match` / `unmatch` / `accept` - Owner decisions
//! - `POST /users/sync` - Upsert a reputation record
//! - `GET /stats/user/:email`, `GET /stats/admin` - Activity stats
//! - `GET /mail/test` - Probe the configured mail transport
//! - `GET /health` - Health check

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use reclaim::api::{AppState, router};
use reclaim::mail::{HttpMailer, Mailer, MemoryMailer};
use reclaim::storage::Storage;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:reclaim.db?mode=rwc";

/// Default sender identity for outbound email.
const DEFAULT_MAIL_FROM: &str = "Campus Lost & Found <no-reply@reclaim.example.edu>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with environment filter
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("reclaim=info".parse()?))
        .init();

    // Load configuration from environment
    let port: u16 = env::var("RECLAIM_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let db_url = env::var("RECLAIM_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    let app_url =
        env::var("RECLAIM_APP_URL").unwrap_or_else(|_| format!("http://localhost:{port}"));

    info!(port, db_url = %db_url, "Starting Reclaim server");

    // Initialize storage
    let storage = Storage::new(&db_url).await?;
    info!("Database initialized");

    // Select the mail transport: the HTTP mail API when a key is
    // configured, otherwise an in-memory sink
    let mail_from = env::var("RECLAIM_MAIL_FROM").unwrap_or_else(|_| DEFAULT_MAIL_FROM.to_string());
    let mailer: Arc<dyn Mailer> = match env::var("RECLAIM_MAIL_API_KEY") {
        Ok(api_key) if !api_key.is_empty() => {
            let mailer = match env::var("RECLAIM_MAIL_API_URL") {
                Ok(base_url) => HttpMailer::with_base_url(&base_url, &api_key, &mail_from),
                Err(_) => HttpMailer::new(&api_key, &mail_from),
            };
            info!(from = %mail_from, "Outbound email enabled");
            Arc::new(mailer)
        }
        _ => {
            warn!("RECLAIM_MAIL_API_KEY not set; outbound email disabled");
            Arc::new(MemoryMailer::new())
        }
    };

    // Create application state
    let state = AppState {
        storage,
        mailer,
        app_url,
    };

    // Build router
    let app = router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Reclaim is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
