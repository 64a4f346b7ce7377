//! ExpirySweeper: periodically terminates pairing sessions past their deadline.
//!
//! `verify` already expires sessions lazily when it reads them, but a code
//! that nobody ever scans would otherwise stay `Pending` forever and its
//! owner would never see `connection_terminated`.  The sweeper closes that
//! gap by calling [`PairingService::sweep_expired`] on a fixed interval.
//!
//! A skipped or overlapping run is harmless: termination is a conditional
//! update, so a session is only reported once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use super::pairing::PairingService;

pub struct ExpirySweeper {
    pairing: PairingService,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(pairing: PairingService, interval: Duration) -> Self {
        Self { pairing, interval }
    }

    /// Runs one sweep, logging (not propagating) storage failures.
    /// Returns how many sessions were terminated.
    pub async fn sweep_once(&self) -> usize {
        match self.pairing.sweep_expired().await {
            Ok(count) => count,
            Err(e) => {
                error!("expiry sweep failed: {e}");
                0
            }
        }
    }

    /// Spawns the sweep loop.  It stops at the first tick after `running`
    /// is cleared.
    pub fn start(self, running: Arc<AtomicBool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval = ?self.interval, "expiry sweeper started");
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; skip it so the first
            // sweep happens one interval after startup.
            ticker.tick().await;

            while running.load(Ordering::Relaxed) {
                ticker.tick().await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                let ended = self.sweep_once().await;
                debug!(ended, "expiry sweep complete");
            }
            info!("expiry sweeper stopped");
        })
    }
}
