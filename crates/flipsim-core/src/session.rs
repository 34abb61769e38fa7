//! Consumer-facing session: runs, stored results, queries, cancellation.
//!
//! A [`Session`] owns everything that would otherwise be global state: the
//! result store and its version counters, the cancellation token, and the
//! launcher that creates a generator for each run.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crate::cancel::CancellationToken;
use crate::config::SimConfig;
use crate::error::{QueryError, RunError};
use crate::orchestrator::{Orchestrator, RunProgress, RunReport, RunRequest};
use crate::query::QueryEngine;
use crate::source::{ProcessLauncher, SourceLauncher};
use crate::stats::StatisticsRecord;
use crate::store::{ResultStore, StoredResult};

/// A run executing on a background thread.
pub struct RunHandle {
    progress: Receiver<RunProgress>,
    handle: JoinHandle<Result<RunReport, RunError>>,
}

impl RunHandle {
    /// Progress updates, one per chunk. Disconnects when the run ends.
    pub fn progress(&self) -> &Receiver<RunProgress> {
        &self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run. A panic on the run thread is re-raised here.
    pub fn join(self) -> Result<RunReport, RunError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Simulation session.
pub struct Session {
    config: SimConfig,
    store: Arc<ResultStore>,
    cancel: Mutex<CancellationToken>,
    launcher: Arc<dyn SourceLauncher>,
}

impl Session {
    /// Session whose runs spawn `config.generator`.
    pub fn new(config: SimConfig) -> Self {
        let launcher = ProcessLauncher::new(config.generator.clone(), config.terminate_grace);
        Self::with_launcher(config, launcher)
    }

    /// Session with a custom source factory.
    pub fn with_launcher(config: SimConfig, launcher: impl SourceLauncher + 'static) -> Self {
        Self {
            config,
            store: Arc::new(ResultStore::new()),
            cancel: Mutex::new(CancellationToken::new()),
            launcher: Arc::new(launcher),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<ResultStore> {
        Arc::clone(&self.store)
    }

    /// Token observed by runs started from now on.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.config.clone(),
            Arc::clone(&self.store),
            self.cancellation_token(),
        )
    }

    /// Run on the calling thread.
    pub fn run(&self, request: &RunRequest) -> Result<RunReport, RunError> {
        let mut source = self.launcher.create();
        self.orchestrator().run(source.as_mut(), request, None)
    }

    /// Run on a background thread, reporting progress over a channel.
    pub fn spawn_run(&self, request: RunRequest) -> RunHandle {
        let orchestrator = self.orchestrator();
        let launcher = Arc::clone(&self.launcher);
        let (tx, rx) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            let mut source = launcher.create();
            orchestrator.run(source.as_mut(), &request, Some(&tx))
        });
        RunHandle {
            progress: rx,
            handle,
        }
    }

    pub fn statistics(&self, label: &str) -> Result<Arc<StatisticsRecord>, QueryError> {
        self.store
            .get(label)
            .ok_or_else(|| QueryError::LabelNotFound(label.to_string()))
    }

    pub fn labels(&self) -> Vec<String> {
        self.store.labels()
    }

    pub fn latest(&self) -> Option<StoredResult> {
        self.store.latest()
    }

    pub fn query_engine(&self) -> QueryEngine {
        QueryEngine::new(
            Arc::clone(&self.store),
            self.config.query_bootstrap_samples,
            self.config.resample_plan(),
        )
    }

    /// Percent chance of a drawdown worse than `value` for `label`.
    pub fn drawdown_percentile(&self, label: &str, value: f64) -> Result<f64, QueryError> {
        self.query_engine().drawdown_percentile(label, value)
    }

    /// Drawdown at `percentile` for `label`.
    pub fn backstop(&self, label: &str, percentile: f64) -> Result<f64, QueryError> {
        self.query_engine().backstop(label, percentile)
    }

    /// Cancel runs in flight and arm a fresh token for the next run.
    pub fn cancel(&self) {
        let mut token = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
    }

    /// Cancel runs in flight and drop every stored result and version counter.
    ///
    /// A run already in flight never writes into the cleared store; it ends
    /// with [`RunError::Discarded`].
    pub fn reset(&self) {
        self.store.reset();
        self.cancel();
    }
}
