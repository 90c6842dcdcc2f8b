//! The watcher: the control loop driving the standby switch.
//!
//! Consumes decoded alarms from the delivery pipeline, keeps the linger
//! timer fresh, and reconciles the switch: on whenever the activation
//! window is open, off once it closes. Activation is level-triggered
//! rather than edge-triggered: every accepted alarm re-asserts
//! switch-on, so the switch-on action must be idempotent.

pub mod store;
pub mod timer;
pub mod trigger;

pub use store::LastAlarmStore;
pub use timer::AlarmTimer;
pub use trigger::{CommandTrigger, Trigger, TriggerError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::tracing::prelude::*;
use crate::wire::Alarm;

/// Capacity of the delivery pipeline between ingress and watcher.
/// Deliberately small: a full pipeline stalls acknowledgment upstream
/// instead of buffering without bound.
pub const PIPELINE_CAPACITY: usize = 10;

pub struct Watcher<On, Off> {
    pipeline: mpsc::Receiver<Alarm>,
    timer: AlarmTimer,
    switch_on: On,
    switch_off: Off,
}

impl<On: Trigger, Off: Trigger> Watcher<On, Off> {
    pub fn new(
        pipeline: mpsc::Receiver<Alarm>,
        timer: AlarmTimer,
        switch_on: On,
        switch_off: Off,
    ) -> Self {
        Self {
            pipeline,
            timer,
            switch_on,
            switch_off,
        }
    }

    /// Run until the token is cancelled or the producer side closes.
    pub async fn run(mut self, cancel: CancellationToken) {
        // A restart inside an open window re-asserts switch-on straight
        // from the persisted time.
        self.activate(&cancel).await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("watcher: shutdown requested");
                    break;
                }
                msg = self.pipeline.recv() => match msg {
                    Some(alarm) => {
                        debug!(id = alarm.id, updated = %alarm.updated_at(), "watcher: alarm received");
                        if self.timer.update(alarm.updated_at()) {
                            self.activate(&cancel).await;
                        } else {
                            debug!(id = alarm.id, "watcher: stale alarm ignored");
                        }
                    }
                    None => {
                        info!("watcher: pipeline closed");
                        break;
                    }
                },
                _ = self.timer.standby() => {
                    info!("watcher: alarm has expired, switching off");
                    if let Err(err) = self.switch_off.fire(&cancel).await {
                        error!(%err, "watcher: switch-off failed");
                    }
                }
            }
        }
    }

    async fn activate(&self, cancel: &CancellationToken) {
        if self.timer.is_active() {
            info!(deadline = %self.timer.standby_deadline(), "watcher: alarm is active, switching on");
            if let Err(err) = self.switch_on.fire(cancel).await {
                error!(%err, "watcher: switch-on failed");
            }
        }
    }
}
