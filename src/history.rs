// Rolling daily delay history, persisted as one JSON array in a blob store.
//
// One record per calendar day, last write wins. Records older than the
// retention window are dropped whenever a new record is merged in.

use chrono::{DateTime, Local, TimeDelta, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::models::{DailyDelayRecord, DelayStats};
use crate::store::{BlobStore, StoreError};

pub const DEFAULT_STORAGE_KEY: &str = "transport-delay-history";
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

/// Which clock decides where one calendar day ends and the next begins.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Calendar {
    #[default]
    Local,
    Zone(Tz),
}

impl Calendar {
    /// `YYYY-MM-DD` of `instant` in this calendar.
    pub fn date_of(&self, instant: DateTime<Utc>) -> String {
        match self {
            Calendar::Local => instant.with_timezone(&Local).format("%Y-%m-%d").to_string(),
            Calendar::Zone(tz) => instant.with_timezone(tz).format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistorySettings {
    pub storage_key: String,
    pub retention_days: u32,
    pub calendar: Calendar,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            retention_days: DEFAULT_RETENTION_DAYS,
            calendar: Calendar::Local,
        }
    }
}

/// Owns the in-memory history and is the only writer of its store key.
pub struct HistoryTracker {
    store: Box<dyn BlobStore>,
    settings: HistorySettings,
    records: Vec<DailyDelayRecord>,
}

impl HistoryTracker {
    /// Build a tracker and load whatever history the store already holds.
    pub fn new(store: Box<dyn BlobStore>, settings: HistorySettings) -> Self {
        let records = Self::load(store.as_ref(), &settings.storage_key);
        info!(
            records = records.len(),
            retention_days = settings.retention_days,
            "delay history loaded"
        );
        Self { store, settings, records }
    }

    /// Read the stored history. Missing, unreadable or corrupt history all
    /// come back as an empty list.
    pub fn load(store: &dyn BlobStore, key: &str) -> Vec<DailyDelayRecord> {
        let contents = match store.get(key) {
            Ok(Some(contents)) => contents,
            Ok(None) => {
                debug!(key, "no stored delay history");
                return Vec::new();
            }
            Err(e) => {
                warn!(key, error = %e, "failed to read delay history, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<DailyDelayRecord>>(&contents) {
            Ok(records) => records,
            Err(e) => {
                warn!(key, error = %e, "stored delay history is corrupt, starting empty");
                Vec::new()
            }
        }
    }

    /// Fold `stats` into `current` as today's record.
    ///
    /// Keeps every record newer than `now - retention_days` that is not for
    /// today, then appends a fresh record for today stamped with `now`.
    pub fn merge(
        current: &[DailyDelayRecord],
        stats: &DelayStats,
        now: DateTime<Utc>,
        settings: &HistorySettings,
    ) -> Vec<DailyDelayRecord> {
        let today = settings.calendar.date_of(now);
        // A window reaching past the representable range keeps everything
        let cutoff = TimeDelta::try_days(i64::from(settings.retention_days))
            .and_then(|window| now.checked_sub_signed(window))
            .map_or(i64::MIN, |cutoff| cutoff.timestamp_millis());

        let mut merged: Vec<DailyDelayRecord> = current
            .iter()
            .filter(|record| record.timestamp > cutoff && record.date != today)
            .cloned()
            .collect();

        merged.push(DailyDelayRecord::from_stats(today, stats, now.timestamp_millis()));
        merged
    }

    /// Write the full history. Failures are logged and swallowed.
    pub fn persist(&self, records: &[DailyDelayRecord]) {
        let key = &self.settings.storage_key;
        let result = serde_json::to_string(records)
            .map_err(StoreError::from)
            .and_then(|json| self.store.set(key, &json));

        match result {
            Ok(()) => debug!(key, records = records.len(), "delay history saved"),
            Err(e) => warn!(key, error = %e, "failed to save delay history"),
        }
    }

    /// Merge a fresh set of stats, persist the result and adopt it in memory.
    pub fn record(&mut self, stats: &DelayStats, now: DateTime<Utc>) -> &[DailyDelayRecord] {
        let updated = Self::merge(&self.records, stats, now, &self.settings);
        self.persist(&updated);
        self.records = updated;
        &self.records
    }

    pub fn records(&self) -> &[DailyDelayRecord] {
        &self.records
    }

    /// Records ordered oldest day first.
    pub fn sorted_by_date(&self) -> Vec<DailyDelayRecord> {
        sort_by_date(&self.records)
    }

}

/// `YYYY-MM-DD` strings sort chronologically as plain text.
pub fn sort_by_date(records: &[DailyDelayRecord]) -> Vec<DailyDelayRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| a.date.cmp(&b.date));
    sorted
}

pub fn record_for<'a>(records: &'a [DailyDelayRecord], date: &str) -> Option<&'a DailyDelayRecord> {
    records.iter().find(|record| record.date == date)
}

/// Largest daily total, never below 1 so it can be used as a divisor.
pub fn max_total_delay(records: &[DailyDelayRecord]) -> u32 {
    records
        .iter()
        .map(|record| record.total_delay_minutes)
        .max()
        .unwrap_or(0)
        .max(1)
}
