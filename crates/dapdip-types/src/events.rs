use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent over the livestream chat gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StreamEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A chat message was posted to a stream
    ChatMessage {
        id: Uuid,
        stream_id: Uuid,
        author_id: Uuid,
        author_username: String,
        content: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A viewer joined the stream
    ViewerJoined {
        stream_id: Uuid,
        user_id: Uuid,
        username: String,
    },

    /// A viewer left the stream
    ViewerLeft {
        stream_id: Uuid,
        user_id: Uuid,
        username: String,
    },

    /// Current viewer count for the stream
    ViewerCount { stream_id: Uuid, count: usize },

    /// The host (or the janitor) ended the stream
    StreamEnded { stream_id: Uuid },

    /// Command-level failure, sent only to the offending connection
    Error { message: String },
}

impl StreamEvent {
    /// Returns the stream this event is scoped to. Clients only receive
    /// events for the stream they have joined; `Ready` is connection-local
    /// and never broadcast.
    pub fn stream_id(&self) -> Option<Uuid> {
        match self {
            Self::Ready { .. } | Self::Error { .. } => None,
            Self::ChatMessage { stream_id, .. } => Some(*stream_id),
            Self::ViewerJoined { stream_id, .. } => Some(*stream_id),
            Self::ViewerLeft { stream_id, .. } => Some(*stream_id),
            Self::ViewerCount { stream_id, .. } => Some(*stream_id),
            Self::StreamEnded { stream_id } => Some(*stream_id),
        }
    }
}

/// Commands sent FROM client TO server over the gateway socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StreamCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Join a live stream as a viewer (implicitly leaves the previous one)
    Join { stream_id: Uuid },

    /// Leave the current stream
    Leave,

    /// Post a chat message to the joined stream
    Chat { content: String },
}
