//! Persisted last-alarm time.
//!
//! A single RFC 3339 line on local disk, so a restart lands back at the
//! right point of the linger window. Loading never fails the caller:
//! anything missing or unreadable degrades to the epoch, meaning "no
//! prior activity".

use std::fs;
use std::path::PathBuf;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::tracing::prelude::*;

pub struct LastAlarmStore {
    path: Option<PathBuf>,
}

impl LastAlarmStore {
    /// `None` disables persistence entirely.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Read the persisted time, or the epoch when unconfigured, absent,
    /// or corrupt.
    pub fn load(&self) -> OffsetDateTime {
        let Some(path) = &self.path else {
            return OffsetDateTime::UNIX_EPOCH;
        };

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    path = %path.display(),
                    %err,
                    "could not read last alarm file, assuming no prior activity"
                );
                return OffsetDateTime::UNIX_EPOCH;
            }
        };

        match OffsetDateTime::parse(raw.trim(), &Rfc3339) {
            Ok(t) => {
                info!(path = %path.display(), last_alarm = %raw.trim(), "loaded last alarm time");
                t
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    %err,
                    "could not parse last alarm time, assuming no prior activity"
                );
                OffsetDateTime::UNIX_EPOCH
            }
        }
    }

    /// Overwrite the record with `t`. No-op when unconfigured; failures
    /// are logged and swallowed.
    pub fn store(&self, t: OffsetDateTime) {
        let Some(path) = &self.path else {
            return;
        };

        let formatted = match t.to_offset(time::UtcOffset::UTC).format(&Rfc3339) {
            Ok(s) => s,
            Err(err) => {
                warn!(%err, "could not format last alarm time");
                return;
            }
        };

        if let Err(err) = fs::write(path, format!("{formatted}\n")) {
            warn!(path = %path.display(), %err, "could not write last alarm time");
        }
    }
}
