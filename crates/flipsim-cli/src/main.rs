//! CLI for flipsim: coin-flip drawdown simulations with bootstrap backstops.

mod commands;

use clap::{Parser, Subcommand};

use commands::SimArgs;

#[derive(Parser)]
#[command(name = "flipsim")]
#[command(about = "flipsim: Monte Carlo drawdowns for repeated coin-flip wagers")]
#[command(version = flipsim_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one simulation and print per-wager drawdown statistics.
    /// Ctrl+C stops the run early and keeps the whole simulations collected so far.
    Run {
        /// Flips per simulated path
        #[arg(long)]
        flips: usize,

        /// Number of simulated paths
        #[arg(long)]
        sims: usize,

        /// Comma-separated wagers, e.g. "1,1,2,3,4"
        #[arg(long, allow_hyphen_values = true)]
        wagers: String,

        #[command(flatten)]
        sim: SimArgs,

        /// Report the chance of a drawdown worse than this (repeatable)
        #[arg(long = "drawdown", allow_negative_numbers = true)]
        drawdowns: Vec<f64>,

        /// Report the drawdown at this percentile, 0-100 (repeatable)
        #[arg(long = "percentile")]
        percentiles: Vec<f64>,

        /// Print machine-readable JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Interactive session: background runs, stored results, queries
    Shell {
        #[command(flatten)]
        sim: SimArgs,
    },

    /// Reference outcome generator speaking the line protocol on stdin/stdout
    Gen {
        /// Fixed RNG seed for reproducible outcomes
        #[arg(long)]
        seed: Option<u64>,

        /// Probability of a winning flip (+1)
        #[arg(long, default_value = "0.5")]
        win_probability: f64,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            flips,
            sims,
            wagers,
            sim,
            drawdowns,
            percentiles,
            json,
        } => commands::run::run(commands::run::RunCommandConfig {
            flips,
            sims,
            wagers: &wagers,
            sim: &sim,
            drawdowns: &drawdowns,
            percentiles: &percentiles,
            json,
        }),
        Commands::Shell { sim } => commands::shell::run(&sim),
        Commands::Gen {
            seed,
            win_probability,
        } => commands::generator::run(seed, win_probability),
    }
}
