//! Simulation orchestrator: pull outcomes, shape them, summarize, store.
//!
//! A run pulls chunks of `simulations` tokens from its source until
//! `flips * simulations * wagers` tokens are collected, checking the
//! cancellation token before every request. When the source fails or the run
//! is cancelled, the tokens collected so far are cut back to whole simulations
//! and processed as a partial run. The source is stopped on every exit path.

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::config::SimConfig;
use crate::error::{RunError, SourceError};
use crate::source::OutcomeSource;
use crate::stats::compute_statistics;
use crate::store::{ResultStore, StoredResult};
use crate::transform::{drawdown, transform};

/// Parameters of one simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub flips: usize,
    pub simulations: usize,
    /// Stake per wager column. Duplicates are allowed and produce separate results.
    pub wagers: Vec<i64>,
}

impl RunRequest {
    pub fn new(flips: usize, simulations: usize, wagers: Vec<i64>) -> Self {
        Self {
            flips,
            simulations,
            wagers,
        }
    }

    pub fn validate(&self) -> Result<(), RunError> {
        if self.flips == 0 {
            return Err(RunError::InvalidRequest("flips must be at least 1".into()));
        }
        if self.simulations == 0 {
            return Err(RunError::InvalidRequest(
                "simulations must be at least 1".into(),
            ));
        }
        if self.wagers.is_empty() {
            return Err(RunError::InvalidRequest(
                "at least one wager is required".into(),
            ));
        }
        if self.total_tokens().is_none() {
            return Err(RunError::InvalidRequest(format!(
                "{} flips x {} sims x {} wagers overflows",
                self.flips,
                self.simulations,
                self.wagers.len()
            )));
        }
        Ok(())
    }

    /// Tokens making up one whole simulation.
    pub fn tokens_per_simulation(&self) -> usize {
        self.flips.saturating_mul(self.wagers.len())
    }

    /// Total tokens the run pulls, `None` on overflow.
    pub fn total_tokens(&self) -> Option<usize> {
        self.flips
            .checked_mul(self.simulations)?
            .checked_mul(self.wagers.len())
    }
}

/// Tokens collected so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunProgress {
    pub collected: usize,
    pub total: usize,
}

impl RunProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.collected as f64 / self.total as f64 * 100.0
    }
}

/// How the pull loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunCompletion {
    Complete,
    Cancelled,
    SourceFailed { reason: String },
}

/// Outcome of a run that stored at least one simulation.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Run id, also used to tag log lines.
    pub id: String,
    pub request: RunRequest,
    pub completion: RunCompletion,
    /// Whole simulations behind every stored record.
    pub simulations_completed: usize,
    /// One entry per wager, in request order.
    pub results: Vec<StoredResult>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_partial(&self) -> bool {
        self.completion != RunCompletion::Complete
    }

    pub fn labels(&self) -> Vec<String> {
        self.results.iter().map(StoredResult::name).collect()
    }
}

/// Stops the source however the run exits.
struct StopOnDrop<'a>(&'a mut dyn OutcomeSource);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Executes runs against a shared store.
pub struct Orchestrator {
    config: SimConfig,
    store: Arc<ResultStore>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: SimConfig, store: Arc<ResultStore>, cancel: CancellationToken) -> Self {
        Self {
            config,
            store,
            cancel,
        }
    }

    /// Run one simulation request against `source`.
    ///
    /// Progress updates are sent after every chunk. A dropped receiver is
    /// ignored. Returns an error, leaving the store untouched, when not a
    /// single whole simulation was collected.
    pub fn run(
        &self,
        source: &mut dyn OutcomeSource,
        request: &RunRequest,
        progress: Option<&Sender<RunProgress>>,
    ) -> Result<RunReport, RunError> {
        request.validate()?;
        let total = request
            .total_tokens()
            .ok_or_else(|| RunError::InvalidRequest("token count overflows".into()))?;
        let id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        let generation = self.store.generation();

        if self.cancel.is_cancelled() {
            log::info!("run {id}: cancelled before start");
            return Err(RunError::Cancelled);
        }

        log::info!(
            "run {id}: {} flips x {} sims, wagers {:?}, source `{}`",
            request.flips,
            request.simulations,
            request.wagers,
            source.name()
        );

        // Grows with each chunk; a cancelled run only ever holds what it pulled.
        let mut raw: Vec<f64> = Vec::new();
        let mut failure: Option<SourceError> = None;
        let mut completion = RunCompletion::Complete;
        {
            let mut guard = StopOnDrop(source);
            guard.0.start()?;

            while raw.len() < total {
                if self.cancel.is_cancelled() {
                    log::info!("run {id}: cancelled after {} of {total} tokens", raw.len());
                    completion = RunCompletion::Cancelled;
                    break;
                }
                let want = request.simulations.min(total - raw.len());
                let result = guard.0.request_chunk(want).and_then(|chunk| {
                    if chunk.len() < want {
                        Err(SourceError::ShortChunk {
                            expected: want,
                            received: chunk.len(),
                        })
                    } else if chunk.len() > want {
                        Err(SourceError::Overlong { expected: want })
                    } else {
                        Ok(chunk)
                    }
                });
                match result {
                    Ok(chunk) => {
                        if raw.try_reserve(chunk.len()).is_err() {
                            log::error!(
                                "run {id}: cannot grow outcome buffer past {} tokens",
                                raw.len()
                            );
                            return Err(RunError::OutOfMemory {
                                tokens: raw.len() + chunk.len(),
                            });
                        }
                        raw.extend_from_slice(&chunk);
                    }
                    Err(e) => {
                        log::warn!("run {id}: source failed after {} tokens: {e}", raw.len());
                        completion = RunCompletion::SourceFailed {
                            reason: e.to_string(),
                        };
                        failure = Some(e);
                        break;
                    }
                }
                log::debug!("run {id}: {}/{total} tokens", raw.len());
                if let Some(tx) = progress {
                    let _ = tx.send(RunProgress {
                        collected: raw.len(),
                        total,
                    });
                }
            }
        }

        let per_sim = request.tokens_per_simulation();
        let whole = raw.len() / per_sim;
        if whole == 0 {
            return Err(match failure {
                Some(e) => RunError::Source(e),
                None => RunError::Cancelled,
            });
        }
        raw.truncate(whole * per_sim);
        let partial = whole < request.simulations;
        if partial {
            log::warn!(
                "run {id}: keeping {whole} of {} simulations",
                request.simulations
            );
        }

        let tensor = transform(raw, whole, request.flips, &request.wagers, self.config.fee)?;
        let drawdowns = drawdown(&tensor);
        drop(tensor);

        let plan = self.config.resample_plan();
        let mut records = Vec::with_capacity(request.wagers.len());
        for (k, &wager) in request.wagers.iter().enumerate() {
            let mut record = compute_statistics(
                &drawdowns.column(k),
                self.config.stats_bootstrap_samples,
                self.config.confidence,
                &plan.fork(k as u64),
            )?;
            record.partial = partial;
            records.push((wager, record));
        }

        let Some(results) = self
            .store
            .put_run(generation, request.flips, request.simulations, records)
        else {
            log::info!("run {id}: store was reset during the run, discarding results");
            return Err(RunError::Discarded);
        };
        let elapsed = started.elapsed();
        log::info!(
            "run {id}: stored {} results in {:.2}s",
            results.len(),
            elapsed.as_secs_f64()
        );

        Ok(RunReport {
            id,
            request: request.clone(),
            completion,
            simulations_completed: whole,
            results,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;

    /// Deterministic source: alternates +1/-1, optionally failing or
    /// cancelling after a number of chunks.
    struct MockSource {
        served: usize,
        fail_after: Option<usize>,
        cancel_after: Option<(usize, CancellationToken)>,
        stopped: Arc<AtomicBool>,
        next: f64,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                served: 0,
                fail_after: None,
                cancel_after: None,
                stopped: Arc::new(AtomicBool::new(false)),
                next: 1.0,
            }
        }
    }

    impl OutcomeSource for MockSource {
        fn name(&self) -> String {
            "mock".into()
        }

        fn start(&mut self) -> Result<(), SourceError> {
            Ok(())
        }

        fn request_chunk(&mut self, n: usize) -> Result<Vec<f64>, SourceError> {
            if self.fail_after == Some(self.served) {
                return Err(SourceError::Closed {
                    expected: n,
                    received: 0,
                });
            }
            self.served += 1;
            if let Some((after, token)) = &self.cancel_after {
                if *after == self.served {
                    token.cancel();
                }
            }
            Ok((0..n)
                .map(|_| {
                    self.next = -self.next;
                    self.next
                })
                .collect())
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    /// Source that hands back the wrong number of tokens.
    struct ShortSource;

    impl OutcomeSource for ShortSource {
        fn name(&self) -> String {
            "short".into()
        }
        fn start(&mut self) -> Result<(), SourceError> {
            Ok(())
        }
        fn request_chunk(&mut self, n: usize) -> Result<Vec<f64>, SourceError> {
            Ok(vec![1.0; n.saturating_sub(1)])
        }
        fn stop(&mut self) {}
    }

    struct FailingStart;

    impl OutcomeSource for FailingStart {
        fn name(&self) -> String {
            "failing".into()
        }
        fn start(&mut self) -> Result<(), SourceError> {
            Err(SourceError::NotRunning)
        }
        fn request_chunk(&mut self, _n: usize) -> Result<Vec<f64>, SourceError> {
            Err(SourceError::NotRunning)
        }
        fn stop(&mut self) {}
    }

    fn config() -> SimConfig {
        SimConfig {
            stats_bootstrap_samples: 50,
            workers: 2,
            seed: Some(11),
            ..SimConfig::default()
        }
    }

    fn orchestrator() -> (Orchestrator, Arc<ResultStore>, CancellationToken) {
        let store = Arc::new(ResultStore::new());
        let token = CancellationToken::new();
        (
            Orchestrator::new(config(), Arc::clone(&store), token.clone()),
            store,
            token,
        )
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    #[test]
    fn test_request_validation() {
        assert!(RunRequest::new(10, 10, vec![1]).validate().is_ok());
        for bad in [
            RunRequest::new(0, 10, vec![1]),
            RunRequest::new(10, 0, vec![1]),
            RunRequest::new(10, 10, vec![]),
            RunRequest::new(usize::MAX, 2, vec![1]),
        ] {
            assert!(matches!(bad.validate(), Err(RunError::InvalidRequest(_))));
        }
    }

    #[test]
    fn test_request_token_counts() {
        let request = RunRequest::new(100, 200, vec![1, 1, 2, 3, 4]);
        assert_eq!(request.total_tokens(), Some(100_000));
        assert_eq!(request.tokens_per_simulation(), 500);
    }

    #[test]
    fn test_progress_percent() {
        let p = RunProgress {
            collected: 25,
            total: 200,
        };
        assert!((p.percent() - 12.5).abs() < 1e-12);
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    #[test]
    fn test_full_run_stores_one_record_per_wager() {
        let (orch, store, _) = orchestrator();
        let mut source = MockSource::new();
        let stopped = Arc::clone(&source.stopped);
        let request = RunRequest::new(100, 200, vec![1, 1, 2, 3, 4]);

        let report = orch.run(&mut source, &request, None).unwrap();

        assert_eq!(report.completion, RunCompletion::Complete);
        assert!(!report.is_partial());
        assert_eq!(report.simulations_completed, 200);
        assert_eq!(store.len(), 5);
        for entry in store.entries() {
            assert_eq!(entry.record.data.len(), 200);
            assert!(!entry.record.partial);
        }
        assert_eq!(
            report.labels(),
            vec![
                "1 - 100 flips - 200 sims",
                "1 - 100 flips - 200 sims v2",
                "2 - 100 flips - 200 sims",
                "3 - 100 flips - 200 sims",
                "4 - 100 flips - 200 sims",
            ]
        );
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_progress_reaches_total() {
        let (orch, _, _) = orchestrator();
        let (tx, rx) = mpsc::channel();
        let request = RunRequest::new(4, 10, vec![1, 2]);
        orch.run(&mut MockSource::new(), &request, Some(&tx)).unwrap();
        drop(tx);

        let updates: Vec<RunProgress> = rx.iter().collect();
        // 80 tokens in chunks of 10.
        assert_eq!(updates.len(), 8);
        assert_eq!(updates.last().unwrap().collected, 80);
        assert!((updates.last().unwrap().percent() - 100.0).abs() < 1e-12);
        for pair in updates.windows(2) {
            assert!(pair[0].collected < pair[1].collected);
        }
    }

    #[test]
    fn test_source_failure_keeps_whole_simulations() {
        let (orch, store, _) = orchestrator();
        let mut source = MockSource::new();
        source.fail_after = Some(3);
        let stopped = Arc::clone(&source.stopped);
        // 4 flips x 1 wager per sim; chunks of 10 tokens. 30 tokens = 7 sims.
        let request = RunRequest::new(4, 10, vec![1]);

        let report = orch.run(&mut source, &request, None).unwrap();

        assert!(matches!(
            report.completion,
            RunCompletion::SourceFailed { .. }
        ));
        assert_eq!(report.simulations_completed, 7);
        let entry = store.latest().unwrap();
        assert_eq!(entry.record.data.len(), 7);
        assert!(entry.record.partial);
        assert_eq!(entry.name(), "1 - 4 flips - 10 sims (partial)");
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_failure_before_first_simulation_leaves_store_untouched() {
        let (orch, store, _) = orchestrator();
        let mut source = MockSource::new();
        source.fail_after = Some(0);
        let stopped = Arc::clone(&source.stopped);

        let err = orch
            .run(&mut source, &RunRequest::new(10, 5, vec![1]), None)
            .unwrap_err();

        assert!(matches!(err, RunError::Source(SourceError::Closed { .. })));
        assert!(store.is_empty());
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_wrong_length_chunk_is_a_failure() {
        let (orch, store, _) = orchestrator();
        let err = orch
            .run(&mut ShortSource, &RunRequest::new(10, 5, vec![1]), None)
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::Source(SourceError::ShortChunk {
                expected: 5,
                received: 4
            })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_start_failure() {
        let (orch, store, _) = orchestrator();
        let err = orch
            .run(&mut FailingStart, &RunRequest::new(10, 5, vec![1]), None)
            .unwrap_err();
        assert!(matches!(err, RunError::Source(SourceError::NotRunning)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_cancel_mid_run_stores_partial() {
        let (orch, store, token) = orchestrator();
        let mut source = MockSource::new();
        source.cancel_after = Some((5, token.clone()));
        // 2 flips x 1 wager: each 20-token chunk is 10 whole sims.
        let request = RunRequest::new(2, 20, vec![1]);

        let report = orch.run(&mut source, &request, None).unwrap();

        assert_eq!(report.completion, RunCompletion::Cancelled);
        assert_eq!(source.served, 5);
        assert_eq!(report.simulations_completed, 50);
        assert!(store.latest().unwrap().record.partial);
    }

    #[test]
    fn test_cancelled_before_start() {
        let (orch, store, token) = orchestrator();
        token.cancel();
        let mut source = MockSource::new();
        let err = orch
            .run(&mut source, &RunRequest::new(10, 5, vec![1]), None)
            .unwrap_err();
        assert!(matches!(err, RunError::Cancelled));
        assert_eq!(source.served, 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_oversized_request_cancelled_after_first_chunk() {
        // 5 billion tokens in total; only the first 100 000-token chunk is pulled.
        let (orch, store, token) = orchestrator();
        let mut source = MockSource::new();
        source.cancel_after = Some((1, token.clone()));
        let request = RunRequest::new(10_000, 100_000, vec![1, 1, 2, 3, 4]);

        let report = orch.run(&mut source, &request, None).unwrap();

        assert_eq!(report.completion, RunCompletion::Cancelled);
        assert_eq!(source.served, 1);
        // 50 000 tokens per simulation.
        assert_eq!(report.simulations_completed, 2);
        assert_eq!(store.len(), 5);
        for entry in store.entries() {
            assert_eq!(entry.record.data.len(), 2);
            assert!(entry.record.partial);
            assert!(entry.name().ends_with("(partial)"));
        }
    }

    #[test]
    fn test_invalid_request_rejected_before_start() {
        let (orch, _, _) = orchestrator();
        let mut source = MockSource::new();
        let err = orch
            .run(&mut source, &RunRequest::new(10, 5, vec![]), None)
            .unwrap_err();
        assert_eq!(err.stage(), crate::error::Stage::Input);
        assert!(!source.stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_runs_version_labels() {
        let (orch, store, _) = orchestrator();
        let request = RunRequest::new(10, 100, vec![1]);
        for _ in 0..3 {
            orch.run(&mut MockSource::new(), &request, None).unwrap();
        }
        assert_eq!(
            store.labels(),
            vec![
                "1 - 10 flips - 100 sims",
                "1 - 10 flips - 100 sims v2",
                "1 - 10 flips - 100 sims v3",
            ]
        );
    }
}
