use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use dapdip_types::events::StreamEvent;

/// Tracks stream viewers and fans events out to connected sockets.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for stream events — connections filter by the
    /// stream they have joined.
    broadcast_tx: broadcast::Sender<StreamEvent>,

    /// Viewer state: stream_id -> (user_id -> username)
    viewers: RwLock<HashMap<Uuid, HashMap<Uuid, String>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                viewers: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to stream events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected sockets.
    pub fn broadcast(&self, event: StreamEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a viewer on a stream. Returns the new viewer count.
    pub async fn join(&self, stream_id: Uuid, user_id: Uuid, username: String) -> usize {
        let mut viewers = self.inner.viewers.write().await;
        let stream = viewers.entry(stream_id).or_default();
        stream.insert(user_id, username);
        stream.len()
    }

    /// Remove a viewer from a stream. Returns the remaining viewer count.
    pub async fn leave(&self, stream_id: Uuid, user_id: Uuid) -> usize {
        let mut viewers = self.inner.viewers.write().await;
        match viewers.get_mut(&stream_id) {
            Some(stream) => {
                stream.remove(&user_id);
                let remaining = stream.len();
                if remaining == 0 {
                    viewers.remove(&stream_id);
                }
                remaining
            }
            None => 0,
        }
    }

    pub async fn viewer_count(&self, stream_id: Uuid) -> usize {
        self.inner
            .viewers
            .read()
            .await
            .get(&stream_id)
            .map_or(0, |stream| stream.len())
    }

    /// Drop all viewer state for a stream that has ended.
    pub async fn clear_stream(&self, stream_id: Uuid) {
        self.inner.viewers.write().await.remove(&stream_id);
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_and_leave_track_viewer_counts() {
        let dispatcher = Dispatcher::new();
        let stream = Uuid::new_v4();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(dispatcher.join(stream, a, "ava".into()).await, 1);
        assert_eq!(dispatcher.join(stream, b, "ben".into()).await, 2);
        // Rejoining is idempotent
        assert_eq!(dispatcher.join(stream, a, "ava".into()).await, 2);

        assert_eq!(dispatcher.leave(stream, a).await, 1);
        assert_eq!(dispatcher.viewer_count(stream).await, 1);
        assert_eq!(dispatcher.leave(stream, b).await, 0);
        assert_eq!(dispatcher.viewer_count(stream).await, 0);
    }

    #[tokio::test]
    async fn clear_stream_drops_all_viewers() {
        let dispatcher = Dispatcher::new();
        let stream = Uuid::new_v4();
        dispatcher.join(stream, Uuid::new_v4(), "ava".into()).await;
        dispatcher.join(stream, Uuid::new_v4(), "ben".into()).await;

        dispatcher.clear_stream(stream).await;
        assert_eq!(dispatcher.viewer_count(stream).await, 0);
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let stream = Uuid::new_v4();

        dispatcher.broadcast(StreamEvent::ViewerCount {
            stream_id: stream,
            count: 7,
        });

        match rx.recv().await.unwrap() {
            StreamEvent::ViewerCount { stream_id, count } => {
                assert_eq!(stream_id, stream);
                assert_eq!(count, 7);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
