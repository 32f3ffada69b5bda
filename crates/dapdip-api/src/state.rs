use std::sync::Arc;

use dapdip_ai::AiClient;
use dapdip_db::Database;
use dapdip_gateway::dispatcher::Dispatcher;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    /// None when no API key is configured — AI features are disabled.
    pub ai: Option<AiClient>,
}

/// Run blocking SQLite work off the async runtime.
pub async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e)))?
        .map_err(ApiError::from)
}
