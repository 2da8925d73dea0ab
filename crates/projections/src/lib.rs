//! Read models fed from the saga result stream.
//!
//! This crate provides the query side of the purchase saga:
//! - [`Projection`] trait for folding stream entries into read models
//! - [`ReadModel`] trait for query access to denormalized data
//! - [`ProjectionProcessor`] for feeding a capped stream topic to projections
//! - [`PurchaseStatusView`]: per-purchase step history and outcome

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::{DEFAULT_BATCH_SIZE, ProjectionProcessor};
pub use projection::{Projection, ProjectionPosition};
pub use read_model::ReadModel;
pub use views::{PurchaseStatus, PurchaseStatusView, StepEvent};
