// Fixed-interval status polling.
//
// One task owns the timer, the in-flight requests and the history tracker.
// Every completion is handled inside that task, so history merges never run
// concurrently. Each request carries a sequence number; a completion older
// than the last one applied is dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::aggregator::calculate_delay_stats;
use crate::fetcher::{self, StatusSource};
use crate::history::HistoryTracker;
use crate::models::{DailyDelayRecord, DelayStats, LineStatus, RawLine};
use crate::normalizer::normalize_lines;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Everything the presentation layer needs for one render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub lines: Vec<LineStatus>,
    pub delay_stats: Option<DelayStats>,
    pub loading: bool,
    pub error: Option<String>,
    /// Oldest day first.
    pub history: Vec<DailyDelayRecord>,
    /// Sequence number of the request this snapshot reflects, 0 before any.
    pub sequence: u64,
    /// Epoch milliseconds of the last applied completion.
    pub updated_at: Option<i64>,
}

impl DashboardSnapshot {
    fn initial(history: Vec<DailyDelayRecord>) -> Self {
        Self {
            lines: Vec::new(),
            delay_stats: None,
            loading: true,
            error: None,
            history,
            sequence: 0,
            updated_at: None,
        }
    }
}

pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    tracker: HistoryTracker,
    interval: Duration,
    state: watch::Sender<DashboardSnapshot>,
    issued: u64,
    applied: u64,
}

impl StatusPoller {
    pub fn new(source: Arc<dyn StatusSource>, tracker: HistoryTracker, interval: Duration) -> Self {
        let (state, _) = watch::channel(DashboardSnapshot::initial(tracker.sorted_by_date()));
        Self {
            source,
            tracker,
            interval,
            state,
            issued: 0,
            applied: 0,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.state.borrow().clone()
    }

    fn next_sequence(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Apply the outcome of request `sequence`, unless something newer has
    /// already been applied.
    fn complete(&mut self, sequence: u64, result: fetcher::Result<Vec<RawLine>>) {
        if sequence <= self.applied {
            debug!(sequence, applied = self.applied, "discarding stale status response");
            return;
        }
        self.applied = sequence;

        let now = Utc::now();
        match result {
            Ok(raw) => {
                let lines = normalize_lines(&raw);
                let stats = calculate_delay_stats(&lines);
                self.tracker.record(&stats, now);
                let history = self.tracker.sorted_by_date();

                info!(
                    sequence,
                    lines = lines.len(),
                    affected = stats.affected_lines,
                    total_delay_minutes = stats.total_delay_minutes,
                    "line status updated"
                );

                self.state.send_modify(|snapshot| {
                    snapshot.lines = lines;
                    snapshot.delay_stats = Some(stats);
                    snapshot.loading = false;
                    snapshot.error = None;
                    snapshot.history = history;
                    snapshot.sequence = sequence;
                    snapshot.updated_at = Some(now.timestamp_millis());
                });
            }
            Err(e) => {
                warn!(
                    sequence,
                    source = self.source.description(),
                    error = %e,
                    "status fetch failed"
                );

                self.state.send_modify(|snapshot| {
                    snapshot.loading = false;
                    snapshot.error = Some(e.user_message().to_string());
                    snapshot.sequence = sequence;
                    snapshot.updated_at = Some(now.timestamp_millis());
                });
            }
        }
    }

    /// Run a single fetch cycle to completion.
    pub async fn poll_once(&mut self) -> DashboardSnapshot {
        let sequence = self.next_sequence();
        let result = self.source.fetch().await;
        self.complete(sequence, result);
        self.snapshot()
    }

    /// Start polling on a background task.
    pub fn spawn(self) -> PollerHandle {
        let state = self.subscribe();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(shutdown_rx));

        PollerHandle {
            state,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight: JoinSet<(u64, fetcher::Result<Vec<RawLine>>)> = JoinSet::new();

        info!(
            source = self.source.description(),
            interval_secs = self.interval.as_secs(),
            "status poller started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    let sequence = self.next_sequence();
                    let source = self.source.clone();
                    in_flight.spawn(async move { (sequence, source.fetch().await) });
                    debug!(sequence, in_flight = in_flight.len(), "status request issued");
                }
                Some(joined) = in_flight.join_next() => match joined {
                    Ok((sequence, result)) => self.complete(sequence, result),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => error!(error = %e, "status request task panicked"),
                },
            }
        }

        in_flight.abort_all();
        info!("status poller stopped");
    }
}

/// Handle to a running poller. Dropping it also stops the poller.
pub struct PollerHandle {
    state: watch::Receiver<DashboardSnapshot>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.state.clone()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.state.borrow().clone()
    }

    /// Stop the timer, abandon in-flight requests and wait for the task.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            error!(error = %e, "status poller task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchError;
    use crate::history::{Calendar, DEFAULT_STORAGE_KEY, HistorySettings};
    use crate::models::RawLineStatus;
    use crate::store::{BlobStore, MemoryBlobStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    enum Step {
        Lines { after: Duration, lines: Vec<RawLine> },
        Fail,
        Hang,
    }

    struct ScriptedSource {
        calls: AtomicUsize,
        script: Vec<Step>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                script,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch(&self) -> fetcher::Result<Vec<RawLine>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self
                .script
                .get(call)
                .or_else(|| self.script.last())
                .cloned()
                .unwrap_or(Step::Fail);

            match step {
                Step::Lines { after, lines } => {
                    time::sleep(after).await;
                    Ok(lines)
                }
                Step::Fail => Err(FetchError::Status(reqwest::StatusCode::BAD_GATEWAY)),
                Step::Hang => std::future::pending().await,
            }
        }

        fn description(&self) -> &str {
            "scripted"
        }
    }

    fn raw(name: &str, severity: i64, description: &str) -> RawLine {
        RawLine {
            id: name.to_lowercase(),
            name: name.to_string(),
            line_statuses: vec![RawLineStatus {
                status_severity: severity,
                status_severity_description: description.to_string(),
                reason: None,
            }],
        }
    }

    fn lines_now(lines: Vec<RawLine>) -> Step {
        Step::Lines {
            after: Duration::ZERO,
            lines,
        }
    }

    fn poller(source: Arc<ScriptedSource>, store: Arc<MemoryBlobStore>) -> StatusPoller {
        let settings = HistorySettings {
            calendar: Calendar::Zone(chrono_tz::UTC),
            ..HistorySettings::default()
        };
        let tracker = HistoryTracker::new(Box::new(store), settings);
        StatusPoller::new(source, tracker, DEFAULT_POLL_INTERVAL)
    }

    #[tokio::test]
    async fn test_initial_snapshot_is_loading() {
        let source = ScriptedSource::new(vec![]);
        let poller = poller(source, Arc::new(MemoryBlobStore::new()));

        let snapshot = poller.snapshot();
        assert!(snapshot.loading);
        assert!(snapshot.lines.is_empty());
        assert!(snapshot.delay_stats.is_none());
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.sequence, 0);
    }

    #[tokio::test]
    async fn test_poll_once_publishes_stats_and_history() {
        let source = ScriptedSource::new(vec![lines_now(vec![
            raw("Central", 4, "Severe Delays"),
            raw("Victoria", 10, "Good Service"),
        ])]);
        let store = Arc::new(MemoryBlobStore::new());
        let mut poller = poller(source, store.clone());

        let snapshot = poller.poll_once().await;
        assert!(!snapshot.loading);
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.lines.len(), 2);

        let stats = snapshot.delay_stats.unwrap();
        assert_eq!(stats.total_delay_minutes, 30);
        assert_eq!(stats.affected_lines, 1);
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].total_delay_minutes, 30);

        let stored = HistoryTracker::load(store.as_ref(), DEFAULT_STORAGE_KEY);
        assert_eq!(stored, snapshot.history);
    }

    #[tokio::test]
    async fn test_repeated_polls_keep_one_record_per_day() {
        let source = ScriptedSource::new(vec![
            lines_now(vec![raw("Central", 4, "Severe Delays")]),
            lines_now(vec![raw("Central", 6, "Minor Delays")]),
        ]);
        let store = Arc::new(MemoryBlobStore::new());
        let mut poller = poller(source, store.clone());

        poller.poll_once().await;
        let snapshot = poller.poll_once().await;

        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].total_delay_minutes, 10);
        assert_eq!(HistoryTracker::load(store.as_ref(), DEFAULT_STORAGE_KEY).len(), 1);
    }

    #[tokio::test]
    async fn test_failure_sets_fixed_message_and_keeps_history() {
        let source = ScriptedSource::new(vec![
            lines_now(vec![raw("Central", 4, "Severe Delays")]),
            Step::Fail,
            lines_now(vec![raw("Central", 10, "Good Service")]),
        ]);
        let mut poller = poller(source, Arc::new(MemoryBlobStore::new()));

        poller.poll_once().await;
        let failed = poller.poll_once().await;
        assert!(!failed.loading);
        assert_eq!(failed.error.as_deref(), Some("Failed to fetch transport status"));
        assert_eq!(failed.history.len(), 1);
        assert_eq!(failed.history[0].total_delay_minutes, 30);
        assert_eq!(failed.sequence, 2);

        let recovered = poller.poll_once().await;
        assert!(recovered.error.is_none());
        assert_eq!(recovered.delay_stats.unwrap().total_delay_minutes, 0);
    }

    #[tokio::test]
    async fn test_first_poll_failure_leaves_no_stats() {
        let source = ScriptedSource::new(vec![Step::Fail]);
        let store = Arc::new(MemoryBlobStore::new());
        let mut poller = poller(source, store.clone());

        let snapshot = poller.poll_once().await;
        assert!(!snapshot.loading);
        assert!(snapshot.delay_stats.is_none());
        assert!(snapshot.error.is_some());
        assert!(store.get(DEFAULT_STORAGE_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_completion_is_discarded() {
        let source = ScriptedSource::new(vec![]);
        let mut poller = poller(source, Arc::new(MemoryBlobStore::new()));

        let older = poller.next_sequence();
        let newer = poller.next_sequence();

        poller.complete(newer, Ok(vec![raw("Northern", 6, "Minor Delays")]));
        poller.complete(older, Ok(vec![raw("Northern", 4, "Severe Delays")]));
        poller.complete(older, Err(FetchError::Decode("late".to_string())));

        let snapshot = poller.snapshot();
        assert_eq!(snapshot.sequence, newer);
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.lines[0].delay_minutes, 10);
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].total_delay_minutes, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_old_response_does_not_overwrite_newer() {
        // First request takes 45s, the second (issued at 30s) answers at once
        let source = ScriptedSource::new(vec![
            Step::Lines {
                after: Duration::from_secs(45),
                lines: vec![raw("Central", 4, "Severe Delays")],
            },
            lines_now(vec![raw("Central", 10, "Good Service")]),
            Step::Hang,
        ]);
        let handle = poller(source.clone(), Arc::new(MemoryBlobStore::new())).spawn();

        time::sleep(Duration::from_secs(50)).await;

        let snapshot = handle.snapshot();
        assert_eq!(source.calls(), 2);
        assert_eq!(snapshot.sequence, 2);
        assert_eq!(snapshot.delay_stats.unwrap().total_delay_minutes, 0);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_request_does_not_block_next_tick() {
        let source = ScriptedSource::new(vec![
            Step::Hang,
            lines_now(vec![raw("Jubilee", 7, "Part Closure")]),
            Step::Hang,
        ]);
        let handle = poller(source.clone(), Arc::new(MemoryBlobStore::new())).spawn();

        time::sleep(Duration::from_secs(10)).await;
        assert!(handle.snapshot().loading);

        time::sleep(Duration::from_secs(25)).await;
        let snapshot = handle.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.sequence, 2);
        assert_eq!(snapshot.delay_stats.unwrap().total_delay_minutes, 15);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_polling() {
        let source = ScriptedSource::new(vec![lines_now(vec![raw("Circle", 10, "Good Service")])]);
        let handle = poller(source.clone(), Arc::new(MemoryBlobStore::new())).spawn();

        time::sleep(Duration::from_secs(65)).await;
        assert_eq!(source.calls(), 3);

        handle.shutdown().await;
        time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_updates() {
        let source = ScriptedSource::new(vec![lines_now(vec![raw("District", 6, "Minor Delays")])]);
        let handle = poller(source, Arc::new(MemoryBlobStore::new())).spawn();
        let mut rx = handle.subscribe();

        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(snapshot.delay_stats.unwrap().affected_lines, 1);

        handle.shutdown().await;
    }
}
