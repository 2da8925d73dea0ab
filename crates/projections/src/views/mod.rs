//! Read model views built from the saga result stream.

pub mod purchase_status;

pub use purchase_status::{PurchaseStatus, PurchaseStatusView, StepEvent};
