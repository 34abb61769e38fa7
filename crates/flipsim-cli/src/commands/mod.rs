pub mod generator;
pub mod run;
pub mod shell;

use clap::Args;
use flipsim_core::{
    DEFAULT_CONFIDENCE, DEFAULT_FEE, DEFAULT_QUERY_BOOTSTRAP_SAMPLES,
    DEFAULT_STATS_BOOTSTRAP_SAMPLES, GeneratorCommand, SimConfig, StatisticsRecord,
};

/// Options shared by every command that runs simulations.
#[derive(Args, Debug, Clone)]
pub struct SimArgs {
    /// Generator command line (whitespace-separated). Defaults to this binary's `gen`.
    #[arg(long)]
    pub generator: Option<String>,

    /// Per-flip fee added to every outcome before wager scaling
    #[arg(long, default_value_t = DEFAULT_FEE, allow_negative_numbers = true)]
    pub fee: f64,

    /// Bootstrap resamples for the mean/median confidence intervals
    #[arg(long, default_value_t = DEFAULT_STATS_BOOTSTRAP_SAMPLES)]
    pub bootstrap: usize,

    /// Bootstrap resamples pooled by drawdown/percentile queries
    #[arg(long, default_value_t = DEFAULT_QUERY_BOOTSTRAP_SAMPLES)]
    pub query_bootstrap: usize,

    /// Confidence level of the bootstrap intervals, in (0, 1)
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    pub confidence: f64,

    /// Seed resampling (and the default generator) for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Resampling worker threads (default: one per core)
    #[arg(long)]
    pub workers: Option<usize>,
}

/// Parse a comma-separated wager list. Duplicates are kept.
pub fn parse_wagers(s: &str) -> Result<Vec<i64>, String> {
    let wagers = s
        .split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(|w| {
            w.parse::<i64>()
                .map_err(|_| format!("invalid wager '{w}': expected an integer"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if wagers.is_empty() {
        return Err("at least one wager is required".to_string());
    }
    Ok(wagers)
}

/// This binary's own `gen` subcommand.
pub fn default_generator(seed: Option<u64>) -> GeneratorCommand {
    let mut command = match std::env::current_exe() {
        Ok(path) => GeneratorCommand::new(path.to_string_lossy()).arg("gen"),
        Err(e) => {
            log::warn!("cannot locate current executable ({e}), using `flipsim gen` from PATH");
            GeneratorCommand::default()
        }
    };
    if let Some(seed) = seed {
        command = command.arg("--seed").arg(seed.to_string());
    }
    command
}

/// Build a session config from command-line options.
pub fn build_config(args: &SimArgs) -> Result<SimConfig, String> {
    if !(args.confidence > 0.0 && args.confidence < 1.0) {
        return Err(format!(
            "confidence {} must be strictly between 0 and 1",
            args.confidence
        ));
    }
    if args.bootstrap == 0 || args.query_bootstrap == 0 {
        return Err("bootstrap sample counts must be at least 1".to_string());
    }
    if !args.fee.is_finite() {
        return Err(format!("fee {} is not finite", args.fee));
    }

    let generator = match args.generator.as_deref() {
        Some(line) => GeneratorCommand::parse(line)
            .ok_or_else(|| "generator command is empty".to_string())?,
        None => default_generator(args.seed),
    };

    let mut config = SimConfig {
        fee: args.fee,
        stats_bootstrap_samples: args.bootstrap,
        confidence: args.confidence,
        query_bootstrap_samples: args.query_bootstrap,
        seed: args.seed,
        generator,
        ..SimConfig::default()
    };
    if let Some(workers) = args.workers {
        config.workers = workers.max(1);
    }
    Ok(config)
}

/// Print one record as an aligned two-column table.
pub fn print_statistics(label: &str, record: &StatisticsRecord) {
    println!("\n{label}");
    println!("  {}", "-".repeat(32));
    for (name, value) in record.summary_rows() {
        println!("  {name:<18} {value:>12.2}");
    }
    if record.partial {
        println!("  ({} simulations, run ended early)", record.simulations);
    }
}
