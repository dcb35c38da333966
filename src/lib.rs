//! Near-real-time transit line status with a rolling local delay history.
//!
//! Raw line records from the upstream status API are normalized into
//! [`LineStatus`] values with a heuristic delay estimate, reduced to a single
//! [`DelayStats`], and folded into a bounded, one-record-per-day history kept
//! in a [`BlobStore`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use transit_delay_watch::{
//!     FileBlobStore, HistorySettings, HistoryTracker, StatusClient, StatusPoller,
//!     DEFAULT_POLL_INTERVAL, DEFAULT_STATUS_URL,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let tracker = HistoryTracker::new(
//!     Box::new(FileBlobStore::in_cache_dir()),
//!     HistorySettings::default(),
//! );
//! let client = StatusClient::new(DEFAULT_STATUS_URL, None)?;
//! let handle = StatusPoller::new(Arc::new(client), tracker, DEFAULT_POLL_INTERVAL).spawn();
//!
//! let mut updates = handle.subscribe();
//! updates.changed().await?;
//! println!("{:?}", updates.borrow().delay_stats);
//!
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod config;
pub mod display;
pub mod fetcher;
pub mod history;
pub mod models;
pub mod normalizer;
pub mod poller;
pub mod store;

pub use aggregator::calculate_delay_stats;
pub use crate::config::AppConfig;
pub use fetcher::{
    DEFAULT_STATUS_URL, FETCH_ERROR_MESSAGE, FetchError, StatusClient, StatusSource,
};
pub use history::{Calendar, HistorySettings, HistoryTracker};
pub use models::{
    DailyDelayRecord, DelayStats, LineStatus, RawLine, RawLineStatus, ServiceLevel, WorstLine,
};
pub use normalizer::{estimate_delay_minutes, normalize_line, normalize_lines};
pub use poller::{DashboardSnapshot, PollerHandle, StatusPoller, DEFAULT_POLL_INTERVAL};
pub use store::{BlobStore, FileBlobStore, MemoryBlobStore, StoreError};
