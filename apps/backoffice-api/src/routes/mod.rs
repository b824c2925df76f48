//! HTTP handlers.

pub mod gateway;
pub mod health;
pub mod live;
pub mod purchases;
