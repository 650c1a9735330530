use anyhow::Context;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::Parser;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use crud_routes::config::{self, AppConfig};
use crud_routes::database::query_builder::TableQuery;
use crud_routes::database::{DatabaseManager, PgStore};
use crud_routes::handlers::{table_router, CrudRoutes};

/// Serve CRUD routes for PostgreSQL tables
#[derive(Debug, Parser)]
#[command(name = "crud-routes", version, about)]
struct Args {
    /// Port to listen on (overrides CRUD_API_PORT / PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind (overrides API_BIND_ADDRESS)
    #[arg(long)]
    bind: Option<String>,

    /// Comma-separated tables to expose (overrides CRUD_TABLES)
    #[arg(short, long, value_delimiter = ',')]
    tables: Option<Vec<String>>,
}

#[derive(Clone)]
struct AppState {
    pool: PgPool,
    prefix: Arc<str>,
    tables: Arc<Vec<String>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, CRUD_TABLES, etc.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let config = apply_args(config::config().clone(), args);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.api.log_level)),
        )
        .init();

    tracing::info!("Starting CRUD API in {:?} mode", config.environment);

    for table in &config.api.tables {
        TableQuery::new(table.as_str()).with_context(|| format!("invalid table name '{}'", table))?;
    }
    if config.api.tables.is_empty() {
        tracing::warn!("No tables configured; set CRUD_TABLES or pass --tables");
    }

    let pool = DatabaseManager::connect(&config.database)
        .await
        .context("failed to connect to database")?;

    let app = app(&config, pool.clone());

    let bind_addr = format!("{}:{}", config.api.bind_address, config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("CRUD API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    DatabaseManager::close(&pool).await;
    Ok(())
}

fn apply_args(mut config: AppConfig, args: Args) -> AppConfig {
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(bind) = args.bind {
        config.api.bind_address = bind;
    }
    if let Some(tables) = args.tables {
        config.api.tables = tables
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
    }
    config
}

fn app(config: &AppConfig, pool: PgPool) -> Router {
    let state = AppState {
        pool: pool.clone(),
        prefix: Arc::from(config.api.prefix.as_str()),
        tables: Arc::new(config.api.tables.clone()),
    };

    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(state);

    let store = PgStore::new(pool);
    for table in &config.api.tables {
        let routes = Arc::new(CrudRoutes::new(table.clone(), store.clone()));
        router = router.merge(table_router(&config.api.prefix, routes));
    }

    if config.security.enable_cors {
        router = router.layer(cors_layer(&config.security.cors_origins));
    }
    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins = origins
        .iter()
        .filter_map(|o| o.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");
    let prefix = &state.prefix;

    Json(json!({
        "success": true,
        "data": {
            "name": "CRUD Routes API",
            "version": version,
            "tables": state.tables.as_slice(),
            "endpoints": {
                "list": format!("GET /{}/:table", prefix),
                "create": format!("POST /{}/:table[?expand=true]", prefix),
                "show": format!("GET /{}/:table/:id", prefix),
                "update": format!("PUT|PATCH /{}/:table/:id", prefix),
                "delete": format!("DELETE /{}/:table/:id", prefix),
                "health": "GET /health",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
