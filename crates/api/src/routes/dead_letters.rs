//! Dead-letter inspection endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use event_bus::DeadLetter;

use crate::state::AppState;

/// GET /dead-letters — messages that exhausted their delivery attempts.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<DeadLetter>> {
    Json(state.dead_letters.list().await)
}
