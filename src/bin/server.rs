use std::{
    env,
    error::Error,
    fs::OpenOptions,
    io,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
};

use axum::{
    Router,
    extract::{MatchedPath, Request},
};
use axum_server::{Handle, tls_rustls::RustlsConfig};
use clap::Parser;
use rusqlite::Connection;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use kasir_saku::{AppState, Store, build_router, graceful_shutdown};

/// The REST API server for Kasir Saku.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database. Without a database every
    /// resource endpoint responds with 503.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Directory the app shell (HTML, scripts, icons, manifest) is served from.
    #[arg(long, default_value = "public")]
    static_dir: PathBuf,

    /// The port to serve the API from.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// The canonical name of the timezone used for "today", e.g. "Asia/Jakarta".
    #[arg(long, default_value = "Etc/UTC")]
    timezone: String,

    /// Directory containing an SSL certificate `cert.pem` and key `key.pem`.
    /// Serves plain HTTP when omitted.
    #[arg(long)]
    cert_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    setup_logging()?;

    let args = Args::parse();

    let secret = env::var("SECRET").map_err(|_| "The environment variable 'SECRET' must be set")?;

    let store = match &args.db_path {
        Some(db_path) => {
            tracing::info!("Opening database at {}", db_path.display());
            Store::sqlite(Connection::open(db_path)?)?
        }
        None => {
            tracing::warn!("No database configured, resource endpoints will respond with 503");
            Store::Unconfigured
        }
    };

    let state = AppState::new(store, &secret, &args.timezone)?;
    let router = add_tracing_layer(build_router(state, &args.static_dir));

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    match &args.cert_path {
        Some(cert_path) => {
            let tls_config = RustlsConfig::from_pem_file(
                cert_path.join("cert.pem"),
                cert_path.join("key.pem"),
            )
            .await?;

            tracing::info!("HTTPS server listening on {}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(router.into_make_service())
                .await?;
        }
        None => {
            tracing::info!("HTTP server listening on {}", addr);
            axum_server::bind(addr)
                .handle(handle)
                .serve(router.into_make_service())
                .await?;
        }
    }

    Ok(())
}

fn setup_logging() -> Result<(), io::Error> {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")?;

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            stdout_log
                .with_filter(filter::LevelFilter::INFO)
                .and_then(debug_log)
                .with_filter(filter::LevelFilter::DEBUG),
        )
        .init();

    Ok(())
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // Errors are logged by the error responses themselves.
        .on_failure(());

    router.layer(tracing_layer)
}
