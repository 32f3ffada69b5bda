use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use dapdip_types::api::{
    Claims, CreatePollRequest, PollAnalysisResponse, PollOptionResponse, PollResponse, VoteRequest,
};
use dapdip_types::time::{format_db_timestamp, parse_db_timestamp};

use crate::error::ApiError;
use crate::parse_uuid;
use crate::state::{AppState, blocking};

const MAX_QUESTION_LEN: usize = 500;
const MAX_OPTION_LEN: usize = 100;
const MIN_OPTIONS: usize = 2;
const MAX_OPTIONS: usize = 10;

pub async fn create_poll(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let question = req.question.trim().to_string();
    if question.is_empty() || question.len() > MAX_QUESTION_LEN {
        return Err(ApiError::BadRequest(format!(
            "question must be 1-{} characters",
            MAX_QUESTION_LEN
        )));
    }

    let labels: Vec<String> = req
        .options
        .iter()
        .map(|o| o.trim().to_string())
        .collect();
    if labels.len() < MIN_OPTIONS || labels.len() > MAX_OPTIONS {
        return Err(ApiError::BadRequest(format!(
            "polls need {}-{} options",
            MIN_OPTIONS, MAX_OPTIONS
        )));
    }
    if labels.iter().any(|l| l.is_empty() || l.len() > MAX_OPTION_LEN) {
        return Err(ApiError::BadRequest(format!(
            "options must be 1-{} characters",
            MAX_OPTION_LEN
        )));
    }

    if let Some(ends_at) = req.ends_at {
        if ends_at <= Utc::now() {
            return Err(ApiError::BadRequest("ends_at must be in the future".into()));
        }
    }

    let poll_id = Uuid::new_v4();
    let options: Vec<(String, String)> = labels
        .into_iter()
        .map(|label| (Uuid::new_v4().to_string(), label))
        .collect();

    state.db.create_poll(
        &poll_id.to_string(),
        &claims.sub.to_string(),
        &question,
        req.multi_choice,
        req.ends_at.map(format_db_timestamp).as_deref(),
        &options,
    )?;

    let response = poll_response(&state, poll_id, claims.sub).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    poll_response(&state, poll_id, claims.sub).await.map(Json)
}

pub async fn vote(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.option_ids.is_empty() {
        return Err(ApiError::BadRequest("select at least one option".into()));
    }

    let mut deduped = req.option_ids.clone();
    deduped.sort();
    deduped.dedup();
    if deduped.len() != req.option_ids.len() {
        return Err(ApiError::BadRequest("duplicate options in ballot".into()));
    }

    let poll = state
        .db
        .get_poll(&poll_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("poll not found".into()))?;

    if let Some(ends_at) = &poll.ends_at {
        if parse_db_timestamp(ends_at) <= Utc::now() {
            return Err(ApiError::BadRequest("poll has ended".into()));
        }
    }

    if !poll.multi_choice && req.option_ids.len() > 1 {
        return Err(ApiError::BadRequest(
            "this poll allows a single choice".into(),
        ));
    }

    let options = state.db.poll_options(&poll_id.to_string())?;
    for option_id in &req.option_ids {
        if !options.iter().any(|o| o.id == option_id.to_string()) {
            return Err(ApiError::BadRequest(format!(
                "option {} does not belong to this poll",
                option_id
            )));
        }
    }

    let votes: Vec<(String, String)> = req
        .option_ids
        .iter()
        .map(|option_id| (Uuid::new_v4().to_string(), option_id.to_string()))
        .collect();

    let recorded = state
        .db
        .record_votes(&poll_id.to_string(), &claims.sub.to_string(), &votes)?;
    if !recorded {
        return Err(ApiError::BadRequest("you have already voted".into()));
    }

    let response = poll_response(&state, poll_id, claims.sub).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// AI read of the current tally.
pub async fn analysis(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(ai) = &state.ai else {
        return Err(ApiError::BadRequest("AI is not configured".into()));
    };

    let poll = state
        .db
        .get_poll(&poll_id.to_string())?
        .ok_or_else(|| ApiError::NotFound("poll not found".into()))?;
    let options = state.db.poll_options(&poll_id.to_string())?;

    let tallies: Vec<(String, i64)> = options
        .into_iter()
        .map(|o| (o.label, o.votes))
        .collect();

    let analysis = ai
        .analyze_poll(&poll.question, &tallies)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(Json(PollAnalysisResponse { analysis }))
}

async fn poll_response(
    state: &AppState,
    poll_id: Uuid,
    viewer: Uuid,
) -> Result<PollResponse, ApiError> {
    let db = state.db.clone();
    let (pid, uid) = (poll_id.to_string(), viewer.to_string());

    let (poll, options, total_voters, voted) = blocking(move || {
        let poll = db.get_poll(&pid)?;
        let options = db.poll_options(&pid)?;
        let total_voters = db.total_voters(&pid)?;
        let voted = db.has_voted(&pid, &uid)?;
        Ok((poll, options, total_voters, voted))
    })
    .await?;

    let poll = poll.ok_or_else(|| ApiError::NotFound("poll not found".into()))?;

    Ok(PollResponse {
        id: poll_id,
        author_id: parse_uuid(&poll.author_id, "poll author id"),
        question: poll.question,
        multi_choice: poll.multi_choice,
        ends_at: poll.ends_at.as_deref().map(parse_db_timestamp),
        options: options
            .into_iter()
            .map(|o| PollOptionResponse {
                id: parse_uuid(&o.id, "option id"),
                label: o.label,
                votes: o.votes,
            })
            .collect(),
        total_voters,
        voted,
        created_at: parse_db_timestamp(&poll.created_at),
    })
}
