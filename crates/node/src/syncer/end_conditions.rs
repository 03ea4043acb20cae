//! End conditions
//!
//! Watchdog loops that stop an otherwise unbounded sync. Both only ever
//! cancel the syncer's token, so the engine observes the stop at its next
//! checkpoint and returns cleanly.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::stateful::StatefulSyncer;

/// Which watchdogs to run alongside a sync.
#[derive(Debug, Clone, Deserialize)]
pub struct EndConditions {
    /// Stop once the head block is at most this many seconds old.
    #[serde(default)]
    pub tip_delay_secs: Option<i64>,

    #[serde(default = "default_tip_poll_interval_secs")]
    pub tip_poll_interval_secs: u64,

    /// Stop after syncing for this long.
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

fn default_tip_poll_interval_secs() -> u64 { 10 }

impl Default for EndConditions {
    fn default() -> Self {
        Self {
            tip_delay_secs: None,
            tip_poll_interval_secs: default_tip_poll_interval_secs(),
            duration_secs: None,
        }
    }
}

impl StatefulSyncer {
    /// Polls storage every `interval` and cancels the sync once it is within
    /// `tip_delay` seconds of the tip. Check failures are retried next tick.
    pub async fn end_at_tip_loop(&self, tip_delay: i64, interval: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            match self.block_storage.at_tip(tip_delay).await {
                Ok(true) => {
                    info!(tip_delay, "Node has reached tip");
                    self.cancel.cancel();
                    return;
                }
                Ok(false) => {}
                Err(e) => warn!("Unable to evaluate if node is at tip: {}", e),
            }
        }
    }

    /// Cancels the sync once `duration` has elapsed.
    pub async fn end_duration_loop(&self, duration: Duration) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(duration) => {
                info!("Syncer has reached end condition after {} seconds", duration.as_secs());
                self.cancel.cancel();
            }
        }
    }

    /// Spawns a watchdog for every configured end condition.
    pub fn spawn_end_conditions(self: &Arc<Self>, conditions: &EndConditions) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if let Some(tip_delay) = conditions.tip_delay_secs {
            let syncer = Arc::clone(self);
            let interval = Duration::from_secs(conditions.tip_poll_interval_secs.max(1));
            handles.push(tokio::spawn(async move {
                syncer.end_at_tip_loop(tip_delay, interval).await;
            }));
        }

        if let Some(secs) = conditions.duration_secs {
            let syncer = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                syncer.end_duration_loop(Duration::from_secs(secs)).await;
            }));
        }

        handles
    }
}
