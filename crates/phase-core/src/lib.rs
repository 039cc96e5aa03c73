//! Core domain types for the Phase staking webhook service.
//!
//! Provides the event enumeration, webhook and delivery models, the
//! registry, and the storage abstraction the delivery engine and HTTP
//! layer build on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod registry;
pub mod secret;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use events::{EventKind, StakingEvent};
pub use models::{Delivery, DeliveryId, DeliveryStatus, Webhook, WebhookHealth, WebhookId};
pub use registry::Registry;
pub use storage::{MemoryStore, PostgresStore, WebhookStore};
pub use time::{Clock, RealClock, TestClock};
