use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::events::SweepEventBus;
use crate::probe_adapter::ProbeAdapter;
use crate::seen_store::SeenSetStore;
use crate::sweep_types::*;

/// Abort reason recorded when the operator stops a sweep
pub const USER_CANCELLED: &str = "user-cancelled";

/// Abort reason recorded when workers exit before the queue is exhausted
pub const WORKERS_FAILED: &str = "workers-failed";

/// Configuration for [`SweepScheduler`]
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Upper bound on concurrent probe calls, whatever the request asks for (default: 4)
    pub max_concurrency: usize,

    /// Pause a worker takes after each check (default: 1 second)
    pub check_delay: Duration,

    /// Emit a progress event every N checked regions (default: 100)
    pub progress_every: usize,

    /// Flush the seen-set after every N new findings (default: only at the end)
    pub checkpoint_every: Option<usize>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            check_delay: Duration::from_secs(1),
            progress_every: 100,
            checkpoint_every: None,
        }
    }
}

/// Main sweep execution engine
pub struct SweepScheduler {
    adapter: Arc<ProbeAdapter>,
    seen: Arc<SeenSetStore>,
    events: SweepEventBus,

    /// Lifecycle, guarded so only one sweep runs at a time
    state: Arc<RwLock<SweepState>>,

    config: SweepConfig,
}

/// Counters the consumer keeps while applying verdicts
#[derive(Debug, Default)]
struct SweepTally {
    checked: usize,
    found: usize,
    errors: usize,
    new_count: usize,
}

type CheckedRegion = (RegionCode, Verdict);

/// One worker of the bounded pool
struct SweepWorker {
    id: usize,
    adapter: Arc<ProbeAdapter>,
    queue: Arc<Mutex<VecDeque<RegionCode>>>,
    results: mpsc::Sender<CheckedRegion>,
    keyword: Arc<str>,
    cancel: CancellationToken,
    check_delay: Duration,
}

impl SweepWorker {
    async fn run(self) {
        debug!("Sweep worker {} started", self.id);

        loop {
            // Holding the queue lock while checking the token means nothing is
            // dequeued once cancellation is observed.
            let next = {
                let mut queue = self.queue.lock().await;
                if self.cancel.is_cancelled() {
                    None
                } else {
                    queue.pop_front()
                }
            };

            let Some(code) = next else {
                break;
            };

            let verdict = self.adapter.check(&code, &self.keyword).await;

            if self.results.send((code, verdict)).await.is_err() {
                warn!("Sweep worker {} lost its result channel", self.id);
                break;
            }

            if !self.check_delay.is_zero() && !self.queue.lock().await.is_empty() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = sleep(self.check_delay) => {}
                }
            }
        }

        debug!("Sweep worker {} finished", self.id);
    }
}

/// Handle to a sweep running on its own task
pub struct SweepHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<SweepSummary, SweepError>>,
}

impl SweepHandle {
    /// Ask the sweep to stop; in-flight checks still finish
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that stops this sweep when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the sweep to finish
    pub async fn wait(self) -> Result<SweepSummary, SweepError> {
        self.task
            .await
            .map_err(|e| SweepError::Task(e.to_string()))?
    }
}

impl SweepScheduler {
    pub fn new(
        adapter: Arc<ProbeAdapter>,
        seen: Arc<SeenSetStore>,
        events: SweepEventBus,
        config: Option<SweepConfig>,
    ) -> Self {
        Self {
            adapter,
            seen,
            events,
            state: Arc::new(RwLock::new(SweepState::Idle)),
            config: config.unwrap_or_default(),
        }
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SweepState {
        *self.state.read().await
    }

    /// Event bus this scheduler emits on
    pub fn events(&self) -> &SweepEventBus {
        &self.events
    }

    /// Run a sweep on a background task
    pub fn spawn(self: &Arc<Self>, request: SweepRequest) -> SweepHandle {
        let cancel = CancellationToken::new();
        let scheduler = Arc::clone(self);
        let token = cancel.clone();

        let task = tokio::spawn(async move { scheduler.run(request, token).await });

        SweepHandle { cancel, task }
    }

    /// Run one sweep to completion or cancellation
    ///
    /// Invalid requests and concurrent runs fail before any event is
    /// emitted. Once started, the sweep always ends with `Completed` or
    /// `Aborted`; per-region failures only show up as error verdicts.
    pub async fn run(
        &self,
        request: SweepRequest,
        cancel: CancellationToken,
    ) -> Result<SweepSummary, SweepError> {
        request.validate()?;

        if self.config.max_concurrency == 0 {
            return Err(SweepError::Configuration(
                "max_concurrency must be positive".to_string(),
            ));
        }

        let total = request.region_codes.len();
        let workers = request
            .concurrency_limit
            .min(self.config.max_concurrency)
            .min(total);

        self.begin().await?;

        let sweep_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            "🚀 Sweep {} started: '{}' over {} regions with {} workers",
            sweep_id, request.keyword, total, workers
        );
        self.events.emit(SweepEvent::Started { total });

        let queue = Arc::new(Mutex::new(VecDeque::from(request.region_codes)));
        let (results_tx, mut results_rx) = mpsc::channel::<CheckedRegion>(workers * 2);
        let keyword: Arc<str> = Arc::from(request.keyword.as_str());

        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|id| {
                let worker = SweepWorker {
                    id,
                    adapter: self.adapter.clone(),
                    queue: queue.clone(),
                    results: results_tx.clone(),
                    keyword: keyword.clone(),
                    cancel: cancel.clone(),
                    check_delay: self.config.check_delay,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        // Workers hold the only remaining senders; the loop ends once they all exit.
        drop(results_tx);

        let mut tally = SweepTally::default();
        let mut cancelling = false;

        loop {
            tokio::select! {
                received = results_rx.recv() => match received {
                    Some((code, verdict)) => self.apply_verdict(code, verdict, total, &mut tally).await,
                    None => break,
                },
                _ = cancel.cancelled(), if !cancelling => {
                    cancelling = true;
                    warn!("⏹️ Sweep {} cancelling, waiting for in-flight checks", sweep_id);
                    self.set_state(SweepState::Cancelling).await;
                }
            }
        }

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Sweep worker task failed: {}", e);
            }
        }

        let abort_reason = if tally.checked == total {
            None
        } else if cancel.is_cancelled() {
            Some(USER_CANCELLED)
        } else {
            error!(
                "Sweep {} workers stopped with {} of {} regions unchecked",
                sweep_id,
                total - tally.checked,
                total
            );
            Some(WORKERS_FAILED)
        };

        if abort_reason.is_none() {
            self.set_state(SweepState::Draining).await;
        }

        if tally.new_count > 0 {
            if let Err(e) = self.seen.flush().await {
                error!("Failed to persist seen-set after sweep {}: {}", sweep_id, e);
            }
        }

        let outcome = match abort_reason {
            Some(reason) => {
                self.set_state(SweepState::Aborted).await;
                self.events.emit(SweepEvent::Aborted {
                    reason: reason.to_string(),
                });
                SweepOutcome::Aborted {
                    reason: reason.to_string(),
                }
            }
            None => {
                self.set_state(SweepState::Completed).await;
                self.events.emit(SweepEvent::Completed {
                    new_count: tally.new_count,
                });
                SweepOutcome::Completed
            }
        };

        info!(
            "🏁 Sweep {} finished: {}/{} checked, {} found, {} new, {} errors",
            sweep_id, tally.checked, total, tally.found, tally.new_count, tally.errors
        );

        Ok(SweepSummary {
            sweep_id,
            keyword: request.keyword,
            total,
            checked: tally.checked,
            found: tally.found,
            errors: tally.errors,
            new_count: tally.new_count,
            outcome,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Move to `Running`, refusing if another sweep is active
    async fn begin(&self) -> Result<(), SweepError> {
        let mut state = self.state.write().await;
        if state.is_active() {
            return Err(SweepError::Configuration(
                "A sweep is already running".to_string(),
            ));
        }
        *state = SweepState::Running;
        Ok(())
    }

    async fn set_state(&self, next: SweepState) {
        *self.state.write().await = next;
    }

    async fn apply_verdict(
        &self,
        code: RegionCode,
        verdict: Verdict,
        total: usize,
        tally: &mut SweepTally,
    ) {
        self.events.emit(SweepEvent::RegionChecked {
            code: code.clone(),
            verdict: verdict.clone(),
        });

        match verdict {
            Verdict::Found(key) => {
                tally.found += 1;
                if self.seen.add_if_absent(&key).await {
                    tally.new_count += 1;
                    info!("🔥 New listing in region {}: {}", code, key);
                    self.events.emit(SweepEvent::NewFinding {
                        code,
                        result_key: key,
                    });
                    self.checkpoint_if_due(tally.new_count).await;
                } else {
                    debug!("Region {} result already seen", code);
                }
            }
            Verdict::None => {}
            Verdict::Error(e) => {
                tally.errors += 1;
                warn!("Region {} check failed: {}", code, e);
            }
        }

        tally.checked += 1;
        if tally.checked % self.config.progress_every.max(1) == 0 || tally.checked == total {
            self.events.emit(SweepEvent::Progress {
                done: tally.checked,
                total,
            });
        }
    }

    async fn checkpoint_if_due(&self, new_count: usize) {
        let Some(every) = self.config.checkpoint_every.filter(|n| *n > 0) else {
            return;
        };

        if new_count % every == 0 {
            if let Err(e) = self.seen.flush().await {
                error!("Seen-set checkpoint failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe_adapter::{PageObservation, ProbeSettings, RegionProbe};
    use tokio::sync::Semaphore;

    /// Finds listings in regions listed in `found`, waiting on `gate` first
    struct GatedProbe {
        found: Vec<&'static str>,
        gate: Arc<Semaphore>,
    }

    #[async_trait::async_trait]
    impl RegionProbe for GatedProbe {
        async fn observe(&self, url: &str) -> Result<PageObservation, ProbeError> {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| ProbeError::Probe(e.to_string()))?;
            permit.forget();

            if self.found.iter().any(|code| url.contains(&format!("in={}&", code))) {
                Ok(PageObservation::ResultsPresent { listings: 1 })
            } else {
                Ok(PageObservation::NoResults)
            }
        }
    }

    fn scheduler(
        seen_path: &std::path::Path,
        found: Vec<&'static str>,
        gate: Arc<Semaphore>,
        config: SweepConfig,
    ) -> Arc<SweepScheduler> {
        let adapter = ProbeAdapter::new(
            Arc::new(GatedProbe { found, gate }),
            Some(ProbeSettings {
                timeout: Duration::from_secs(5),
                ..ProbeSettings::default()
            }),
        );
        Arc::new(SweepScheduler::new(
            Arc::new(adapter),
            Arc::new(SeenSetStore::with_keys(seen_path, Vec::new())),
            SweepEventBus::new(),
            Some(config),
        ))
    }

    fn fast_config() -> SweepConfig {
        SweepConfig {
            check_delay: Duration::ZERO,
            ..SweepConfig::default()
        }
    }

    fn codes(raw: &[&str]) -> Vec<RegionCode> {
        raw.iter().map(|c| RegionCode::new(*c)).collect()
    }

    #[tokio::test]
    async fn test_invalid_requests_fail_before_any_event() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(
            &dir.path().join("seen.txt"),
            Vec::new(),
            Arc::new(Semaphore::new(100)),
            fast_config(),
        );
        let mut events = scheduler.events().subscribe();

        let empty = SweepRequest::new("bike", Vec::new(), 1);
        let blank = SweepRequest::new(" ", codes(&["1"]), 1);
        let zero = SweepRequest::new("bike", codes(&["1"]), 0);

        for request in [empty, blank, zero] {
            let err = scheduler
                .run(request, CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, SweepError::Configuration(_)));
        }

        assert!(events.try_recv().is_err());
        assert_eq!(scheduler.state().await, SweepState::Idle);
    }

    #[tokio::test]
    async fn test_completed_sweep_summary_and_state() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(
            &dir.path().join("seen.txt"),
            vec!["2"],
            Arc::new(Semaphore::new(100)),
            fast_config(),
        );

        let summary = scheduler
            .run(
                SweepRequest::new("bike", codes(&["1", "2", "3"]), 2),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(summary.outcome, SweepOutcome::Completed);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.checked, 3);
        assert_eq!(summary.found, 1);
        assert_eq!(summary.new_count, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(scheduler.state().await, SweepState::Completed);
    }

    #[tokio::test]
    async fn test_second_concurrent_run_is_rejected() {
        let gate = Arc::new(Semaphore::new(0));
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(
            &dir.path().join("seen.txt"),
            Vec::new(),
            gate.clone(),
            fast_config(),
        );
        let mut events = scheduler.events().subscribe();

        let handle = scheduler.spawn(SweepRequest::new("bike", codes(&["1", "2"]), 1));
        assert_eq!(events.recv().await, Some(SweepEvent::Started { total: 2 }));

        let err = scheduler
            .run(
                SweepRequest::new("bike", codes(&["3"]), 1),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SweepError::Configuration(_)));

        gate.add_permits(2);
        let summary = handle.wait().await.unwrap();
        assert_eq!(summary.checked, 2);
    }

    #[tokio::test]
    async fn test_progress_cadence() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(
            &dir.path().join("seen.txt"),
            Vec::new(),
            Arc::new(Semaphore::new(100)),
            SweepConfig {
                progress_every: 2,
                ..fast_config()
            },
        );
        let mut events = scheduler.events().subscribe();

        scheduler
            .run(
                SweepRequest::new("bike", codes(&["1", "2", "3", "4", "5"]), 3),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let mut progress = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SweepEvent::Progress { done, total } = event {
                assert_eq!(total, 5);
                progress.push(done);
            }
        }

        assert_eq!(progress, vec![2, 4, 5]);
    }

    #[tokio::test]
    async fn test_no_pause_after_last_region() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler(
            &dir.path().join("seen.txt"),
            Vec::new(),
            Arc::new(Semaphore::new(100)),
            SweepConfig {
                check_delay: Duration::from_secs(10),
                ..SweepConfig::default()
            },
        );

        let started = std::time::Instant::now();
        let summary = scheduler
            .run(
                SweepRequest::new("bike", codes(&["1", "2"]), 2),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(summary.outcome, SweepOutcome::Completed);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_panicking_probe_does_not_end_the_sweep() {
        struct PanicsOnTwo;

        #[async_trait::async_trait]
        impl RegionProbe for PanicsOnTwo {
            async fn observe(&self, url: &str) -> Result<PageObservation, ProbeError> {
                if url.contains("in=2&") {
                    panic!("renderer crashed");
                }
                Ok(PageObservation::NoResults)
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let scheduler = SweepScheduler::new(
            Arc::new(ProbeAdapter::new(Arc::new(PanicsOnTwo), None)),
            Arc::new(SeenSetStore::with_keys(dir.path().join("seen.txt"), Vec::new())),
            SweepEventBus::new(),
            Some(fast_config()),
        );
        let mut events = scheduler.events().subscribe();

        let summary = scheduler
            .run(
                SweepRequest::new("bike", codes(&["1", "2", "3", "4"]), 1),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(summary.outcome, SweepOutcome::Completed);
        assert_eq!(summary.checked, 4);
        assert_eq!(summary.errors, 1);

        let mut verdicts = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SweepEvent::RegionChecked { code, verdict } = event {
                verdicts.push((code.to_string(), verdict));
            }
        }
        assert_eq!(verdicts.len(), 4);
        assert_eq!(verdicts[0], ("1".to_string(), Verdict::None));
        assert!(matches!(
            &verdicts[1],
            (code, Verdict::Error(ProbeError::Probe(_))) if code == "2"
        ));
        assert_eq!(verdicts[3], ("4".to_string(), Verdict::None));
    }

    #[tokio::test]
    async fn test_checkpoint_flushes_mid_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.txt");
        let adapter = ProbeAdapter::new(
            Arc::new(GatedProbe {
                found: vec!["1", "2"],
                gate: Arc::new(Semaphore::new(100)),
            }),
            None,
        );
        let seen = Arc::new(SeenSetStore::load(&path).await.unwrap());
        let scheduler = SweepScheduler::new(
            Arc::new(adapter),
            seen,
            SweepEventBus::new(),
            Some(SweepConfig {
                checkpoint_every: Some(1),
                ..fast_config()
            }),
        );

        let summary = scheduler
            .run(
                SweepRequest::new("bike", codes(&["1", "2"]), 1),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(summary.new_count, 2);
        let persisted = std::fs::read_to_string(&path).unwrap();
        assert_eq!(persisted.lines().count(), 2);
    }
}
