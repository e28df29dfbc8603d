//! Physical time effect
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `arealink-effects` (system clock), `arealink-testkit` (controllable)
//! - **Usage**: snapshot stamping, expiry checks, renewal backoff and scheduling

use crate::time::PhysicalTime;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error type for time operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum TimeError {
    /// No clock is available
    #[error("Time service unavailable")]
    ServiceUnavailable,
    /// The clock failed to answer
    #[error("Operation failed: {reason}")]
    OperationFailed { reason: String },
}

/// Wall-clock time and cooperative sleeping
#[async_trait]
pub trait PhysicalTimeEffects: Send + Sync {
    /// Current wall-clock time
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError>;

    /// Suspend the caller for `ms` milliseconds
    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError>;
}

/// Blanket implementation for Arc<T> where T: PhysicalTimeEffects
#[async_trait]
impl<T: PhysicalTimeEffects + ?Sized> PhysicalTimeEffects for std::sync::Arc<T> {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        (**self).physical_time().await
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        (**self).sleep_ms(ms).await
    }
}
