//! Simulation configuration.
//!
//! One [`SimConfig`] is owned by each [`Session`](crate::session::Session) and
//! cloned into every run. Defaults: a 0.0014 per-flip fee, 1000 resamples for
//! the confidence intervals, 10 000 resamples for percentile/backstop queries.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resample::ResamplePlan;

/// Per-flip transaction drag added to every raw outcome before wager scaling.
pub const DEFAULT_FEE: f64 = 0.0014;

/// Resamples drawn for each bootstrap confidence interval.
pub const DEFAULT_STATS_BOOTSTRAP_SAMPLES: usize = 1000;

/// Two-sided confidence level of the bootstrap intervals.
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Resamples pooled by the percentile and backstop queries.
pub const DEFAULT_QUERY_BOOTSTRAP_SAMPLES: usize = 10_000;

/// How long a generator gets to exit after a terminate request before it is killed.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Program and arguments used to spawn the outcome generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl GeneratorCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Split a command line on whitespace: the first word is the program.
    ///
    /// Returns `None` for a blank string. No shell quoting is interpreted; wrap
    /// complex invocations in a script.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut words = command_line.split_whitespace();
        let program = words.next()?;
        Some(Self {
            program: program.to_string(),
            args: words.map(str::to_string).collect(),
        })
    }
}

impl Default for GeneratorCommand {
    fn default() -> Self {
        Self::new("flipsim").arg("gen")
    }
}

impl fmt::Display for GeneratorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Configuration for a simulation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Added to every raw outcome before wager scaling.
    pub fee: f64,
    /// Resamples per bootstrap confidence interval.
    pub stats_bootstrap_samples: usize,
    /// Confidence level of the mean and median intervals, in (0, 1).
    pub confidence: f64,
    /// Resamples pooled by percentile and backstop queries.
    pub query_bootstrap_samples: usize,
    /// Worker threads used for resampling.
    pub workers: usize,
    /// Fixed RNG seed. `None` seeds every worker from the OS.
    pub seed: Option<u64>,
    /// Grace period between terminate and kill when stopping the generator.
    pub terminate_grace: Duration,
    /// Outcome generator to spawn for each run.
    pub generator: GeneratorCommand,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fee: DEFAULT_FEE,
            stats_bootstrap_samples: DEFAULT_STATS_BOOTSTRAP_SAMPLES,
            confidence: DEFAULT_CONFIDENCE,
            query_bootstrap_samples: DEFAULT_QUERY_BOOTSTRAP_SAMPLES,
            workers: default_workers(),
            seed: None,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            generator: GeneratorCommand::default(),
        }
    }
}

impl SimConfig {
    pub fn with_generator(mut self, generator: GeneratorCommand) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Resampling plan derived from `workers` and `seed`.
    pub fn resample_plan(&self) -> ResamplePlan {
        ResamplePlan::new(self.workers, self.seed)
    }
}

/// Worker count for resampling: one per available core.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = SimConfig::default();
        assert!((config.fee - 0.0014).abs() < f64::EPSILON);
        assert_eq!(config.stats_bootstrap_samples, 1000);
        assert!((config.confidence - 0.95).abs() < f64::EPSILON);
        assert_eq!(config.query_bootstrap_samples, 10_000);
        assert!(config.workers >= 1);
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_generator_parse_splits_words() {
        let cmd = GeneratorCommand::parse("python3 flip.py --fast").unwrap();
        assert_eq!(cmd.program, "python3");
        assert_eq!(cmd.args, vec!["flip.py", "--fast"]);
        assert_eq!(cmd.to_string(), "python3 flip.py --fast");
    }

    #[test]
    fn test_generator_parse_blank_is_none() {
        assert!(GeneratorCommand::parse("").is_none());
        assert!(GeneratorCommand::parse("   ").is_none());
    }

    #[test]
    fn test_builder_helpers() {
        let config = SimConfig::default()
            .with_seed(7)
            .with_generator(GeneratorCommand::new("sh").arg("-c").arg("true"));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.generator.to_string(), "sh -c true");
        assert_eq!(config.resample_plan().seed(), Some(7));
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = SimConfig::default().with_seed(42);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SimConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
