//! enrollmentd: HTTP surface over the enrollment orchestrator
//!
//! Triggers for enrollment, completion and progress events, plus chain
//! status, history, stats and the per-kind dependency map.

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use error::{ApiError, ApiResult, DaemonError, DaemonResult};
pub use server::Server;
