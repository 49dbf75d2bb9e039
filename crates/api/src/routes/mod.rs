//! HTTP route handlers.

pub mod admin;
pub mod demo;
pub mod health;
pub mod metrics;
pub mod sagas;
