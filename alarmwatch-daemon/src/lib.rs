//! Alarm-driven standby switch daemon.
//!
//! alarmwatch consumes alarm notifications delivered over a push
//! subscription and drives a binary standby switch: on while alarms are
//! fresh, off once a configurable linger time has passed without one.
//! The watcher keeps the switch state reconciled across restarts by
//! persisting the last accepted alarm time.

pub mod config;
pub mod ingress;
pub mod tracing;
pub mod watch;
pub mod wire;
