use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use dapdip_db::Database;
use dapdip_gateway::dispatcher::Dispatcher;
use dapdip_types::events::StreamEvent;

/// Background task that force-ends streams whose hosts walked away.
///
/// Runs on an interval, finds streams live past the configured maximum,
/// marks them ended, and tells any remaining viewers.
pub async fn run_janitor_loop(
    db: Arc<Database>,
    dispatcher: Dispatcher,
    interval_secs: u64,
    max_stream_hours: u32,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match sweep(&db, &dispatcher, max_stream_hours).await {
            Ok(count) => {
                if count > 0 {
                    info!("Janitor: ended {} stale streams", count);
                }
            }
            Err(e) => {
                warn!("Janitor error: {}", e);
            }
        }
    }
}

async fn sweep(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    max_stream_hours: u32,
) -> anyhow::Result<usize> {
    let modifier = format!("-{} hours", max_stream_hours);

    let stale = {
        let db = db.clone();
        tokio::task::spawn_blocking(move || db.stale_live_streams(&modifier)).await??
    };

    let count = stale.len();
    for id in stale {
        {
            let db = db.clone();
            let id = id.clone();
            tokio::task::spawn_blocking(move || db.end_stream(&id)).await??;
        }

        match id.parse::<Uuid>() {
            Ok(stream_id) => {
                dispatcher.broadcast(StreamEvent::StreamEnded { stream_id });
                dispatcher.clear_stream(stream_id).await;
            }
            Err(e) => warn!("Corrupt stream id '{}': {}", id, e),
        }
    }

    Ok(count)
}
