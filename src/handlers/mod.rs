use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use log::{error, info};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ErrorResponse, VoteResponse, VotesResponse, iso_timestamp};
use crate::votes::{VoteError, VoteStore};

pub const VOTE_RECORDED: &str = "Vote recorded successfully";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn VoteStore>,
}

/// A failed store call, reported as a 500 with the underlying message.
pub struct ApiError {
    context: &'static str,
    source: VoteError,
}

impl ApiError {
    fn new(context: &'static str, source: VoteError) -> Self {
        Self { context, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.context.to_string(),
            message: self.source.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

// GET /api/votes
pub async fn get_votes(State(state): State<AppState>) -> Result<Json<VotesResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    info!("[{}] GET /api/votes - Fetching current vote count", request_id);

    match state.store.get_count().await {
        Ok(count) => Ok(Json(VotesResponse {
            count,
            timestamp: iso_timestamp(Utc::now()),
        })),
        Err(e) => {
            error!("[{}] Error fetching vote count: {}", request_id, e);
            Err(ApiError::new("Failed to fetch vote count", e))
        }
    }
}

// POST /api/vote
pub async fn post_vote(State(state): State<AppState>) -> Result<Json<VoteResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    info!("[{}] POST /api/vote - Incrementing vote count", request_id);

    match state.store.increment_and_store().await {
        Ok(count) => {
            info!("[{}] Vote recorded, count is now {}", request_id, count);
            Ok(Json(VoteResponse {
                count,
                message: VOTE_RECORDED.to_string(),
                timestamp: iso_timestamp(Utc::now()),
            }))
        }
        Err(e) => {
            error!("[{}] Error incrementing vote: {}", request_id, e);
            Err(ApiError::new("Failed to record vote", e))
        }
    }
}
