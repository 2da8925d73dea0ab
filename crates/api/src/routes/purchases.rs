//! Purchase submission and status polling.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::PurchaseId;
use domain::{CreatePurchase, PurchasedItem};
use projections::PurchaseStatus;
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseRequest {
    pub items: Vec<PurchasedItem>,
    pub currency_code: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseAccepted {
    pub purchase_id: PurchaseId,
    pub correlation_id: String,
}

/// POST /purchases — price the cart and start its saga.
///
/// Answers `202 Accepted`: the outcome is reported by the status endpoint.
#[tracing::instrument(skip(state, req), fields(user_id = %user.0))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(req): Json<CreatePurchaseRequest>,
) -> Result<(StatusCode, Json<PurchaseAccepted>), ApiError> {
    let created = state
        .purchases
        .create_purchase(
            user.0,
            CreatePurchase {
                items: req.items,
                currency_code: req.currency_code,
            },
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PurchaseAccepted {
            purchase_id: created.purchase.id,
            correlation_id: created.correlation_id.to_string(),
        }),
    ))
}

/// GET /purchases/{id} — step history and outcome of the caller's purchase.
pub async fn get(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(id): Path<u64>,
) -> Result<Json<PurchaseStatus>, ApiError> {
    let id = PurchaseId::new(id);
    let status = state
        .statuses
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Purchase {id} not found")))?;

    if status.user_id != user.0 {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(status))
}

/// GET /purchases — the caller's purchases, most recent first.
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Json<Vec<PurchaseStatus>> {
    Json(state.statuses.by_user(user.0).await)
}
