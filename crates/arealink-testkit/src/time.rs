//! Controllable time source for deterministic testing

use arealink_core::{PhysicalTime, PhysicalTimeEffects, TimeError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct ClockState {
    now_ms: u64,
    frozen: bool,
    sleeps: Vec<u64>,
}

/// Clock that only moves when told to.
///
/// `sleep_ms` yields once to the scheduler and then advances the clock by the
/// requested amount (unless frozen) instead of waiting, and records the
/// requested duration so backoff schedules can be asserted.
#[derive(Debug, Clone, Default)]
pub struct ControllableTime {
    state: Arc<Mutex<ClockState>>,
}

impl ControllableTime {
    /// Create a clock reading `now_ms`
    pub fn new(now_ms: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                now_ms,
                ..ClockState::default()
            })),
        }
    }

    /// Current reading in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.state.lock().now_ms
    }

    /// Current reading
    pub fn now(&self) -> PhysicalTime {
        PhysicalTime::from_millis(self.now_ms())
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.now_ms = state.now_ms.saturating_add(by.as_millis() as u64);
    }

    /// Set the clock
    pub fn set(&self, now_ms: u64) {
        self.state.lock().now_ms = now_ms;
    }

    /// Keep `sleep_ms` from moving the clock
    pub fn freeze(&self) {
        self.state.lock().frozen = true;
    }

    /// Let `sleep_ms` move the clock again
    pub fn unfreeze(&self) {
        self.state.lock().frozen = false;
    }

    /// Every duration passed to `sleep_ms`, in order
    pub fn sleeps(&self) -> Vec<u64> {
        self.state.lock().sleeps.clone()
    }
}

#[async_trait]
impl PhysicalTimeEffects for ControllableTime {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        Ok(self.now())
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        state.sleeps.push(ms);
        if !state.frozen {
            state.now_ms = state.now_ms.saturating_add(ms);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleeping_advances_and_records() {
        let clock = ControllableTime::new(1_000);
        clock.sleep_ms(250).await.unwrap();
        clock.freeze();
        clock.sleep_ms(500).await.unwrap();
        assert_eq!(clock.now_ms(), 1_250);
        assert_eq!(clock.sleeps(), vec![250, 500]);
    }
}
