//! Layer 3: Production Effect Handlers
//!
//! Stateless implementations of the effect traits from `arealink-core`:
//!
//! - [`FilesystemTextStore`]: durable `SecureTextStore` keeping one file per key
//! - [`RealTimeHandler`]: system clock and Tokio sleeping
//! - [`HttpAreaClient`]: `AreaClient` over HTTP/JSON
//!
//! **Layer Constraint**: no mock handlers here; those live in
//! `arealink-testkit`.

#![forbid(unsafe_code)]

pub mod network;
pub mod storage;
pub mod time;

pub use network::HttpAreaClient;
pub use storage::FilesystemTextStore;
pub use time::RealTimeHandler;
