//! HTTP route handlers.

pub mod dead_letters;
pub mod ops;
pub mod products;
pub mod purchases;
