use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window end {end} must be after start {start}")]
    Empty { start: i64, end: i64 },

    #[error("window bounds out of range")]
    OutOfRange,
}

/// Source of "now" in epoch seconds.
pub trait Clock: Send + Sync {
    fn now_epoch(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// `[start, end)` range of epoch seconds covered by one round of fetch calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Result<Self, WindowError> {
        if end <= start {
            return Err(WindowError::Empty { start, end });
        }
        Ok(Self { start, end })
    }

    /// The single window of an ad-hoc run.
    ///
    /// Defaults to `[now - delay - span, now - delay)`; an explicit start moves the window,
    /// an explicit end replaces `start + span`.
    pub fn ad_hoc(
        now: i64,
        collection_delay: Duration,
        span: Duration,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Self, WindowError> {
        let start = match start {
            Some(start) => start,
            None => now
                .checked_sub(secs(collection_delay))
                .and_then(|t| t.checked_sub(secs(span)))
                .ok_or(WindowError::OutOfRange)?,
        };
        let end = match end {
            Some(end) => end,
            None => start
                .checked_add(secs(span))
                .ok_or(WindowError::OutOfRange)?,
        };
        Self::new(start, end)
    }

    /// First tail window: one poll interval wide, ending `delay` before now.
    pub fn tail_initial(
        now: i64,
        poll_interval: Duration,
        collection_delay: Duration,
    ) -> Result<Self, WindowError> {
        let end = now
            .checked_sub(secs(collection_delay))
            .ok_or(WindowError::OutOfRange)?;
        let start = end
            .checked_sub(secs(poll_interval))
            .ok_or(WindowError::OutOfRange)?;
        Self::new(start, end)
    }

    /// Window following this one: starts where this one ended, ends `delay` before now.
    ///
    /// `None` while no new second has become eligible.
    pub fn next_tail(&self, now: i64, collection_delay: Duration) -> Option<Self> {
        let end = now.checked_sub(secs(collection_delay))?;
        Self::new(self.end, end).ok()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.end - self.start).unwrap_or(0))
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let format = |ts: i64| {
            DateTime::<Utc>::from_timestamp(ts, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| ts.to_string())
        };
        write!(f, "[{}, {})", format(self.start), format(self.end))
    }
}
