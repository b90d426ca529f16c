//! Condition monitor: external boolean signals (power, connectivity),
//! polled on background tasks and republished only on actual change.
//!
//! Monitors never touch engine state directly; deduplicated updates are
//! handed off over an mpsc channel and consumed on the engine's context.

pub mod net;
pub mod power;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// A deduplicated change in one external condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionChange {
    Charging(bool),
    Connectivity(bool),
}

/// Suppresses repeated identical samples of one boolean signal.
/// The last-known value starts `false`: a first sample of `true` emits a
/// change, a first sample of `false` does not.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: bool,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample; returns the new value only when it differs from the
    /// last-known one.
    pub fn observe(&mut self, now: bool) -> Option<bool> {
        if now == self.last {
            None
        } else {
            self.last = now;
            Some(now)
        }
    }
}

/// Spawn the power-source poller. Sends `ConditionChange::Charging` on every
/// actual change until cancelled or the receiver is dropped.
pub fn spawn_power_monitor(
    probe: power::PowerSupplyProbe,
    tx: mpsc::Sender<ConditionChange>,
    poll_interval: Duration,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        let mut detector = ChangeDetector::new();
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    if let Some(charging) = detector.observe(probe.is_charging()) {
                        tracing::debug!(charging, "power state changed");
                        if tx.send(ConditionChange::Charging(charging)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
}

/// Spawn the reachability poller. Sends `ConditionChange::Connectivity` on
/// every actual change until cancelled or the receiver is dropped.
pub fn spawn_net_monitor(
    probe: net::ReachabilityProbe,
    tx: mpsc::Sender<ConditionChange>,
    poll_interval: Duration,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        let mut detector = ChangeDetector::new();
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    if let Some(connected) = detector.observe(probe.is_connected().await) {
                        tracing::debug!(connected, "connectivity changed");
                        if tx.send(ConditionChange::Connectivity(connected)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
}
