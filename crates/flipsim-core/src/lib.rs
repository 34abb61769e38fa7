//! # flipsim-core
//!
//! **Monte Carlo drawdown estimates for repeated coin-flip wagers.**
//!
//! `flipsim-core` pulls ±1 outcomes from an external generator process,
//! turns them into per-wager returns, measures the worst cumulative position
//! (drawdown) of every simulated path, and summarizes each wager's drawdowns
//! with descriptive statistics and bootstrap confidence intervals. Stored
//! results can then be queried for the chance of a drawdown beyond a given
//! size, or the drawdown at a given percentile (the backstop).
//!
//! ## Quick Start
//!
//! ```no_run
//! use flipsim_core::{RunRequest, Session, SimConfig};
//!
//! let session = Session::new(SimConfig::default());
//!
//! // 200 simulations of 100 flips, for five wagers.
//! let report = session.run(&RunRequest::new(100, 200, vec![1, 1, 2, 3, 4])).unwrap();
//! for result in &report.results {
//!     println!("{}: median drawdown {}", result.label, result.record.median);
//! }
//!
//! let label = report.results[0].label.to_string();
//! let pct = session.drawdown_percentile(&label, 10.0).unwrap();
//! let backstop = session.backstop(&label, 5.0).unwrap();
//! println!("P(drawdown < -10) = {pct:.2}%, 5th percentile = {backstop:.2}");
//! ```
//!
//! ## Architecture
//!
//! Generator → Orchestrator (chunks) → Transform → Drawdown → Statistics → Store → Queries
//!
//! - **Source**: the [`OutcomeSource`] trait; [`ProcessSource`] speaks the
//!   line protocol with a child process.
//! - **Orchestrator**: pulls chunks, honours the [`CancellationToken`], and
//!   keeps whole simulations when a run ends early.
//! - **Store**: versioned labels, `"{wager} - {flips} flips - {sims} sims[ vN]"`.
//! - **Queries**: pooled bootstrap over a stored sample.

pub mod cancel;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod query;
pub mod resample;
pub mod session;
pub mod source;
pub mod stats;
pub mod store;
pub mod transform;

pub use cancel::CancellationToken;
pub use config::{
    DEFAULT_CONFIDENCE, DEFAULT_FEE, DEFAULT_QUERY_BOOTSTRAP_SAMPLES,
    DEFAULT_STATS_BOOTSTRAP_SAMPLES, DEFAULT_TERMINATE_GRACE, GeneratorCommand, SimConfig,
    default_workers,
};
pub use error::{QueryError, RunError, SourceError, Stage, StatsError, TransformError};
pub use orchestrator::{Orchestrator, RunCompletion, RunProgress, RunReport, RunRequest};
pub use query::{PooledDistribution, QueryEngine, backstop, drawdown_percentile, pooled_bootstrap};
pub use resample::ResamplePlan;
pub use session::{RunHandle, Session};
pub use source::{OutcomeSource, ProcessLauncher, ProcessSource, SourceLauncher};
pub use stats::{ConfidenceInterval, StatisticsRecord, compute_statistics};
pub use store::{ResultLabel, ResultStore, RunKey, StoredResult};
pub use transform::{DrawdownMatrix, ReturnTensor, drawdown, transform};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
