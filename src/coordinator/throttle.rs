//! Spacing of release-list calls shared by all repositories of a run

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::fetch::Sleeper;

pub struct Throttle {
    spacing: Duration,
    next_slot: Mutex<Option<Instant>>,
    sleeper: Arc<dyn Sleeper>,
}

impl Throttle {
    pub fn new(spacing: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            spacing,
            next_slot: Mutex::new(None),
            sleeper,
        }
    }

    /// Reserve the next call slot and wait for it
    pub async fn wait(&self) {
        if self.spacing.is_zero() {
            return;
        }

        let delay = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next_slot.map_or(now, |next| next.max(now));
            *next_slot = slot.checked_add(self.spacing);
            slot.saturating_duration_since(now)
        };

        if !delay.is_zero() {
            self.sleeper.sleep(delay).await;
        }
    }
}
