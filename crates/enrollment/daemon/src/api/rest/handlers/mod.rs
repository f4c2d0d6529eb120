//! REST API handlers

pub mod chains;
pub mod events;
pub mod health;
