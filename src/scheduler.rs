//! Broadcast Scheduler
//!
//! Decides when the local client samples and publishes its position. Ticks
//! are aligned to a global wall-clock grid: with period P every client fires
//! at multiples of P, so emissions across independent clients stay within P
//! of each other without a central clock authority. The scheduler is owned by
//! the engine's single event loop; re-arming or disabling replaces the one
//! pending deadline, so a cancelled tick can never fire.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::error::SyncError;
use crate::models::GeoPosition;

/// External position source (GPS, simulation, ...). May fail per call;
/// failures skip one tick and never stop the schedule.
#[async_trait]
pub trait PositionSource: Send {
    async fn current_position(&mut self) -> Result<GeoPosition, SyncError>;
}

/// Delay until the next wall-clock multiple of `period_ms`.
pub fn grid_delay_ms(now_unix_ms: u64, period_ms: u64) -> u64 {
    period_ms - (now_unix_ms % period_ms)
}

#[derive(Debug)]
pub struct BroadcastScheduler {
    period: Duration,
    enabled: bool,
    deadline: Option<Instant>,
}

impl BroadcastScheduler {
    pub fn new(period: Duration) -> Self {
        BroadcastScheduler {
            period,
            enabled: true,
            deadline: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_armed(&self) -> bool {
        self.enabled && self.deadline.is_some()
    }

    /// Arm the first tick at the next wall-clock multiple of the period,
    /// using the supplied clock reading.
    pub fn align_to_grid(&mut self, now_unix_ms: u64) {
        let delay = grid_delay_ms(now_unix_ms, self.period.as_millis() as u64);
        self.deadline = Some(Instant::now() + Duration::from_millis(delay));
        debug!("scheduler: grid-aligned, first tick in {}ms", delay);
    }

    /// Arm the first tick against the real wall clock.
    pub fn align_to_grid_now(&mut self) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.align_to_grid(now_ms);
    }

    /// On-demand emission just happened: the next grid tick would be
    /// redundant, so restart the period from now. Replaces any pending
    /// deadline.
    pub fn restart_from_now(&mut self) {
        self.deadline = Some(Instant::now() + self.period);
        debug!("scheduler: restarted, next tick in {:?}", self.period);
    }

    /// Gate the periodic timer. Disabling cancels the pending deadline;
    /// re-enabling leaves the scheduler disarmed until the caller aligns or
    /// restarts it.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.deadline = None;
            debug!("scheduler: suspended, pending tick cancelled");
        }
    }

    /// Resolve at the armed deadline and advance it by one period. Never
    /// resolves while disabled or disarmed.
    pub async fn tick(&mut self) {
        match (self.enabled, self.deadline) {
            (true, Some(deadline)) => {
                tokio::time::sleep_until(deadline).await;
                self.deadline = Some(deadline + self.period);
            }
            _ => futures::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_delay() {
        // Starting at 12 305 ms with P = 10 000 ms, the first tick lands on
        // the 20 000 ms grid line.
        assert_eq!(grid_delay_ms(12_305, 10_000), 7_695);
        assert_eq!(grid_delay_ms(0, 10_000), 10_000);
        assert_eq!(grid_delay_ms(19_999, 10_000), 1);
        assert_eq!(grid_delay_ms(20_000, 10_000), 10_000);
    }

    #[test]
    fn test_disable_cancels_deadline() {
        let mut sched = BroadcastScheduler::new(Duration::from_millis(10_000));
        sched.align_to_grid(12_305);
        assert!(sched.is_armed());
        sched.set_enabled(false);
        assert!(!sched.is_armed());
    }
}
