//! Wall-clock time for telemetry.
//!
//! The network time source only hands out seconds since the Unix epoch; the
//! UTC/DST offsets and the `YYYY-MM-DD HH:MM:SS` rendering happen here.
//! Calendar conversion uses Howard Hinnant's `civil_from_days`
//! (<http://howardhinnant.github.io/date_algorithms.html>), valid for every
//! date in the proleptic Gregorian calendar.

use core::fmt::{self, Write};

use log::{error, info};

/// `YYYY-MM-DD HH:MM:SS`
pub const TIMESTAMP_LEN: usize = 19;

/// Formatted local time. Empty until the first successful sync.
pub type Timestamp = heapless::String<TIMESTAMP_LEN>;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeError {
    /// `configure_time_source` has not succeeded yet.
    NotConfigured,
    /// The source has no valid time yet.
    NotSynced,
    /// The year does not fit in four digits.
    OutOfRange,
}

impl fmt::Display for TimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "time source not configured"),
            Self::NotSynced => write!(f, "time not synchronized"),
            Self::OutOfRange => write!(f, "time out of range"),
        }
    }
}

impl core::error::Error for TimeError {}

/// Network time source, SNTP on the device.
pub trait TimeSource {
    /// Starts synchronizing against `server`.
    fn configure(&mut self, server: &str) -> anyhow::Result<()>;
    /// Seconds since the Unix epoch in UTC, `None` while unsynchronized.
    fn now_utc(&mut self) -> Option<i64>;
}

/// Convert days since Unix epoch to civil date (year, month, day).
fn civil_from_days(days_since_epoch: i64) -> (i64, u32, u32) {
    // Shift epoch from 1970-01-01 to 0000-03-01 so the leap day ends the year
    let z = days_since_epoch + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = (z - era * 146_097) as u32; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365; // [0, 399]
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // March = 0
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}

/// Renders local seconds since the epoch as `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(local_secs: i64) -> Result<Timestamp, TimeError> {
    let days = local_secs.div_euclid(SECONDS_PER_DAY);
    let secs_today = local_secs.rem_euclid(SECONDS_PER_DAY);
    let (year, month, day) = civil_from_days(days);
    if !(0..=9999).contains(&year) {
        return Err(TimeError::OutOfRange);
    }

    let mut out = Timestamp::new();
    write!(
        out,
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year,
        month,
        day,
        secs_today / 3600,
        (secs_today % 3600) / 60,
        secs_today % 60
    )
    .map_err(|_| TimeError::OutOfRange)?;
    Ok(out)
}

pub struct TimeSync<T> {
    source: T,
    offset_secs: i64,
    configured: bool,
    last: Timestamp,
}

impl<T: TimeSource> TimeSync<T> {
    pub fn new(source: T) -> Self {
        Self {
            source,
            offset_secs: 0,
            configured: false,
            last: Timestamp::new(),
        }
    }

    /// One-time setup: local offset from UTC plus daylight saving offset.
    pub fn configure_time_source(
        &mut self,
        offset_secs: i32,
        dst_offset_secs: i32,
        server: &str,
    ) -> anyhow::Result<()> {
        self.offset_secs = offset_secs as i64 + dst_offset_secs as i64;
        self.source.configure(server)?;
        self.configured = true;
        info!("Time source {} configured, offset {} s", server, self.offset_secs);
        Ok(())
    }

    /// Queries the source. On failure the last known value stays as it was.
    pub fn sync_time(&mut self) -> Result<Timestamp, TimeError> {
        if !self.configured {
            error!("Failed to get time: {}", TimeError::NotConfigured);
            return Err(TimeError::NotConfigured);
        }
        let result = match self.source.now_utc() {
            Some(utc) => format_timestamp(utc + self.offset_secs),
            None => Err(TimeError::NotSynced),
        };
        match result {
            Ok(stamp) => {
                info!("Local time: {}", stamp);
                self.last = stamp.clone();
                Ok(stamp)
            }
            Err(e) => {
                error!("Failed to get time: {}", e);
                Err(e)
            }
        }
    }

    /// Last successful timestamp, empty if there never was one.
    pub fn last_known(&self) -> &Timestamp {
        &self.last
    }

    #[cfg(test)]
    pub(crate) fn source_mut(&mut self) -> &mut T {
        &mut self.source
    }
}
