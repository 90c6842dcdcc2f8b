//! Linger timer.
//!
//! Tracks the time of the most recent accepted alarm and derives
//! whether the switch should currently be on. The activation window is
//! half-open: active on `[last_update, last_update + linger)`, inactive
//! from the standby deadline onward.

use std::future;
use std::time::Duration;

use time::OffsetDateTime;

/// Persistence callback invoked with every accepted update.
pub type StoreFn = Box<dyn Fn(OffsetDateTime) + Send + Sync>;

pub struct AlarmTimer {
    linger: Duration,
    last_update: OffsetDateTime,
    store: Option<StoreFn>,
}

impl AlarmTimer {
    pub fn new(linger: Duration, last_update: OffsetDateTime) -> Self {
        Self {
            linger,
            last_update,
            store: None,
        }
    }

    /// Attach the persistence callback invoked on accepted updates.
    pub fn with_store(mut self, store: StoreFn) -> Self {
        self.store = Some(store);
        self
    }

    pub fn last_update(&self) -> OffsetDateTime {
        self.last_update
    }

    /// Offer a candidate update time. Returns whether it was accepted.
    ///
    /// Times not strictly after the current value are ignored entirely:
    /// no state change and no persistence call. This makes duplicate
    /// and out-of-order deliveries idempotent and keeps a stale event
    /// from re-arming an already expired window.
    pub fn update(&mut self, t: OffsetDateTime) -> bool {
        if t <= self.last_update {
            return false;
        }
        self.last_update = t;
        if let Some(store) = &self.store {
            store(t);
        }
        true
    }

    /// Time at which the switch should turn off absent further alarms.
    pub fn standby_deadline(&self) -> OffsetDateTime {
        self.last_update + self.linger
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    pub fn is_active(&self) -> bool {
        !self.is_expired()
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.standby_deadline()
    }

    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        !self.is_expired_at(now)
    }

    /// Wait until the standby deadline.
    ///
    /// Completes once at the deadline. If the window has already
    /// expired the returned future never completes, so a merge loop
    /// selecting over it cannot busy-spin.
    pub async fn standby(&self) {
        let until = self.standby_deadline() - OffsetDateTime::now_utc();
        if until.is_positive() {
            tokio::time::sleep(until.unsigned_abs()).await;
        } else {
            future::pending::<()>().await;
        }
    }
}
