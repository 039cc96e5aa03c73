//! HTTP API for the Phase staking webhook service.
//!
//! Exposes webhook registration management and health endpoints, plus
//! the service configuration loader.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use server::{create_router, start_server, AppState};
