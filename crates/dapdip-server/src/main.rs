mod config;
mod janitor;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use dapdip_api::state::{AppState, AppStateInner};
use dapdip_gateway::connection::{self, GatewayState};
use dapdip_gateway::dispatcher::Dispatcher;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dapdip=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(dapdip_db::Database::open(&config.db_path)?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let ai = dapdip_ai::AiClient::from_env();
    if ai.is_none() {
        info!("AI features disabled (DAPDIP_AI_API_KEY not set)");
    }

    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: config.jwt_secret.clone(),
        dispatcher: dispatcher.clone(),
        ai,
    });

    let gateway_state = GatewayState {
        db: db.clone(),
        dispatcher: dispatcher.clone(),
        jwt_secret: config.jwt_secret.clone(),
    };

    // Stream janitor
    tokio::spawn(janitor::run_janitor_loop(
        db.clone(),
        dispatcher.clone(),
        config.janitor_interval_secs,
        config.max_stream_hours,
    ));

    // Routes
    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_state);

    let app = dapdip_api::router(app_state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("DapDip server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(
    State(state): State<GatewayState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, state))
}
