//! Webhook delivery engine for the Phase staking platform.
//!
//! Turns staking events into signed HTTP deliveries with bounded
//! retries and per-webhook failure tracking.
//!
//! # Architecture
//!
//! The dispatcher fans each staking event out into delivery records,
//! one per subscribed active webhook. A pool of async workers claims
//! ready deliveries from storage, signs the payload snapshot with the
//! webhook's secret, POSTs it, and records the outcome:
//!
//! 1. **Claim** - atomic batch claim, lock-free across workers
//! 2. **Sign and send** - HMAC-SHA256 signature, bounded timeout
//! 3. **Record** - success, scheduled retry, or exhaustion
//!
//! Retries use exponential backoff with jitter. Deliveries that
//! exhaust their attempt budget count against the webhook; too many
//! consecutive exhaustions deactivate it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod retry;
pub mod signature;
pub mod tracker;
pub mod worker;
pub mod worker_pool;

pub use client::{ClientConfig, DeliveryClient};
pub use dispatcher::Dispatcher;
pub use error::{DeliveryError, Result};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use tracker::FailureTracker;
pub use worker::{DeliveryConfig, DeliveryEngine, EngineStats};

/// Default number of concurrent delivery workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default batch size for claiming deliveries from storage.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
