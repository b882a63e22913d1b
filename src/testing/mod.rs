//! Testing utilities for request logging
//!
//! This module provides:
//! - [`MemorySink`], a sink that keeps records in memory for assertions
//! - Alba-style scenarios that run a request through a logged Axum router
//!   without starting a server
//! - [`sample_record`], a ready-made record for exercising custom sinks
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::{Router, routing};
//! use request_logging::{LogPolicy, testing};
//!
//! #[tokio::test]
//! async fn test_health_is_logged() {
//!     let app = Router::new().route("/health", routing::get(|| async { "ok" }));
//!
//!     let outcome = testing::get(app, "/health")
//!         .with_policy(LogPolicy::default())
//!         .execute()
//!         .await
//!         .assert_ok();
//!
//!     let record = outcome.single_record();
//!     assert_eq!(record.path, "/health");
//! }
//! ```

mod fixtures;
mod memory;
mod scenario;

pub use fixtures::sample_record;
pub use memory::MemorySink;
pub use scenario::{Scenario, ScenarioAssert, delete, get, patch, post, put};
