//! Real time effect handler for production use

use arealink_core::{PhysicalTime, PhysicalTimeEffects, TimeError};
use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// System clock handler
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeHandler;

impl RealTimeHandler {
    /// Create a new real time handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhysicalTimeEffects for RealTimeHandler {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TimeError::OperationFailed {
                reason: format!("System clock is before the Unix epoch: {e}"),
            })?;
        Ok(PhysicalTime::from_millis(since_epoch.as_millis() as u64))
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_time_after_2020() {
        let now = RealTimeHandler::new().physical_time().await.unwrap();
        assert!(now.as_secs() > 1_577_836_800);
    }
}
