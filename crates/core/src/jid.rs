//! Job id generation.
//!
//! Ids are the UTC admission time at microsecond resolution. Calls that land
//! in the same (or an earlier) tick are bumped one microsecond past the last
//! id handed out, so ids from one generator are strictly increasing.

use std::sync::Mutex;

use chrono::{DateTime, Duration, SubsecRound, Utc};

use crate::models::JobId;

#[derive(Debug, Default)]
pub struct JidGenerator {
    last: Mutex<Option<DateTime<Utc>>>,
    suffix: Option<String>,
}

impl JidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `_<pid>` to every id, for hosts running many callers at once.
    pub fn with_unique_suffix(pid: u32) -> Self {
        Self {
            last: Mutex::new(None),
            suffix: Some(pid.to_string()),
        }
    }

    pub fn generate(&self) -> JobId {
        self.generate_at(Utc::now())
    }

    pub fn generate_at(&self, clock_time: DateTime<Utc>) -> JobId {
        let now = clock_time.trunc_subsecs(6);
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let ts = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(ts);
        JobId::from_timestamp(ts, self.suffix.as_deref())
    }
}
