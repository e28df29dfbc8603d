//! arealink Testing Infrastructure
//!
//! Deterministic doubles for the effect traits in `arealink-core`, plus
//! fixtures for identities and grants.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! arealink-testkit = { path = "../arealink-testkit" }
//! ```
//!
//! ```rust,no_run
//! use arealink_testkit::*;
//!
//! let clock = ControllableTime::new(1_000_000);
//! let store = MemoryTextStore::new();
//! let client = MockAreaClient::new();
//! client.push_refresh(Ok(arealink_core::ApiResponse::Ok(
//!     fixtures::credential_grant("fresh", clock.now_ms() + 3_600_000),
//! )));
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod client;
pub mod fixtures;
pub mod storage;
pub mod time;

pub use client::{Endpoint, MockAreaClient};
pub use storage::{MemoryTextStore, StorageOp};
pub use time::ControllableTime;

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; silent by default.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off")),
        )
        .with_test_writer()
        .try_init();
}
