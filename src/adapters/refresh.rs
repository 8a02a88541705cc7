// Refresh clock adapters - Pacing of the frame pump

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::ports::{RefreshClock, RefreshTick};

/// Refreshes as fast as the pipeline allows; every tick advances one source frame
#[derive(Debug, Default)]
pub struct FreeRunningRefresh;

#[async_trait]
impl RefreshClock for FreeRunningRefresh {
    async fn next_refresh(&mut self) -> RefreshTick {
        tokio::task::yield_now().await;
        RefreshTick {
            playback_target: None,
        }
    }
}

/// Refreshes at a fixed display rate and plays the source in real time
pub struct PacedRefresh {
    interval: Interval,
    started: Option<Instant>,
}

impl PacedRefresh {
    pub fn new(refresh_hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / refresh_hz.max(1) as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            interval,
            started: None,
        }
    }
}

#[async_trait]
impl RefreshClock for PacedRefresh {
    async fn next_refresh(&mut self) -> RefreshTick {
        let now = self.interval.tick().await;
        let started = *self.started.get_or_insert(now);
        RefreshTick {
            playback_target: Some(now.duration_since(started).as_secs_f64()),
        }
    }
}
