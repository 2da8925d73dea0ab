//! Product catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use inventory::{NewProduct, Product};

use crate::error::ApiError;
use crate::state::AppState;

/// POST /products — add a product with its initial stock.
#[tracing::instrument(skip(state, product), fields(name = %product.name))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(product): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.products.create_product(product).await?;
    tracing::info!(product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /products
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.products.list_products().await?))
}

/// GET /products/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.products.get_product(ProductId::new(id)).await?))
}
