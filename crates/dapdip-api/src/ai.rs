use axum::{Extension, Json, extract::State, response::IntoResponse};

use dapdip_types::api::{Claims, SummarizeRequest, SummarizeResponse};

use crate::error::ApiError;
use crate::state::AppState;

const MAX_SUMMARIZE_LEN: usize = 4000;

/// Run user content through moderation before accepting it. With AI disabled
/// everything passes; with AI enabled a flagged verdict rejects the request
/// and an unreachable moderator is a server error, not a pass.
pub(crate) async fn ensure_allowed(state: &AppState, content: &str) -> Result<(), ApiError> {
    let Some(ai) = &state.ai else {
        return Ok(());
    };

    let verdict = ai
        .moderate(content)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    if verdict.flagged {
        let reason = verdict.reason.unwrap_or_else(|| "policy violation".into());
        return Err(ApiError::BadRequest(format!(
            "content rejected by moderation: {}",
            reason
        )));
    }

    Ok(())
}

pub async fn summarize(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<SummarizeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(ai) = &state.ai else {
        return Err(ApiError::BadRequest("AI is not configured".into()));
    };

    let content = req.content.trim();
    if content.is_empty() || content.len() > MAX_SUMMARIZE_LEN {
        return Err(ApiError::BadRequest(format!(
            "content must be 1-{} characters",
            MAX_SUMMARIZE_LEN
        )));
    }

    let summary = ai
        .summarize(content)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(Json(SummarizeResponse { summary }))
}
