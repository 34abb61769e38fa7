use std::collections::BTreeMap;
use std::io::Write;

use flipsim_core::{RunCompletion, RunReport, RunRequest, Session};
use serde::Serialize;

use super::SimArgs;

pub struct RunCommandConfig<'a> {
    pub flips: usize,
    pub sims: usize,
    pub wagers: &'a str,
    pub sim: &'a SimArgs,
    pub drawdowns: &'a [f64],
    pub percentiles: &'a [f64],
    pub json: bool,
}

#[derive(Serialize)]
struct OddsView {
    drawdown: f64,
    percent: f64,
}

#[derive(Serialize)]
struct BackstopView {
    percentile: f64,
    drawdown: f64,
}

#[derive(Serialize)]
struct ResultView {
    label: String,
    wager: i64,
    partial: bool,
    simulations: usize,
    statistics: BTreeMap<&'static str, f64>,
    drawdown_odds: Vec<OddsView>,
    backstops: Vec<BackstopView>,
}

#[derive(Serialize)]
struct ReportView<'a> {
    id: &'a str,
    flips: usize,
    simulations: usize,
    wagers: &'a [i64],
    completion: &'a RunCompletion,
    simulations_completed: usize,
    elapsed_secs: f64,
    results: Vec<ResultView>,
}

pub fn run(cfg: RunCommandConfig) {
    let wagers = super::parse_wagers(cfg.wagers).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(2);
    });
    let config = super::build_config(cfg.sim).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(2);
    });
    if let Some(p) = cfg.percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
        eprintln!("Error: percentile {p} is outside [0, 100]");
        std::process::exit(2);
    }

    let generator = config.generator.to_string();
    let session = Session::new(config);

    let token = session.cancellation_token();
    if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
        log::warn!("Ctrl+C handler unavailable: {e}");
    }

    let request = RunRequest::new(cfg.flips, cfg.sims, wagers);
    if !cfg.json {
        eprintln!(
            "Running {} sims x {} flips for wagers {:?} (generator: {generator})",
            request.simulations, request.flips, request.wagers
        );
    }

    let handle = session.spawn_run(request);
    for progress in handle.progress().iter() {
        if !cfg.json {
            eprint!("\r  collected {:>6.2}%", progress.percent());
            let _ = std::io::stderr().flush();
        }
    }
    if !cfg.json {
        eprintln!();
    }

    let report = match handle.join() {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Run failed ({} stage): {e}", e.stage());
            std::process::exit(1);
        }
    };

    let views = build_views(&session, &report, cfg.drawdowns, cfg.percentiles);

    if cfg.json {
        let view = ReportView {
            id: &report.id,
            flips: report.request.flips,
            simulations: report.request.simulations,
            wagers: &report.request.wagers,
            completion: &report.completion,
            simulations_completed: report.simulations_completed,
            elapsed_secs: report.elapsed.as_secs_f64(),
            results: views,
        };
        match serde_json::to_string_pretty(&view) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to serialize report: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    match &report.completion {
        RunCompletion::Complete => {}
        RunCompletion::Cancelled => println!(
            "Run cancelled: {} of {} simulations kept",
            report.simulations_completed, report.request.simulations
        ),
        RunCompletion::SourceFailed { reason } => println!(
            "Generator failed ({reason}): {} of {} simulations kept",
            report.simulations_completed, report.request.simulations
        ),
    }

    for (stored, view) in report.results.iter().zip(&views) {
        super::print_statistics(&view.label, &stored.record);
        for odds in &view.drawdown_odds {
            println!(
                "  P(drawdown worse than {:.2}) = {:.2}%",
                -odds.drawdown.abs(),
                odds.percent
            );
        }
        for b in &view.backstops {
            println!("  {:.1}th percentile drawdown = {:.2}", b.percentile, b.drawdown);
        }
    }
    println!("\nDone in {:.2}s", report.elapsed.as_secs_f64());
}

fn build_views(
    session: &Session,
    report: &RunReport,
    drawdowns: &[f64],
    percentiles: &[f64],
) -> Vec<ResultView> {
    let engine = session.query_engine();
    report
        .results
        .iter()
        .map(|stored| {
            let label = stored.name();
            let drawdown_odds = drawdowns
                .iter()
                .filter_map(|&d| match engine.drawdown_percentile(&label, d) {
                    Ok(percent) => Some(OddsView {
                        drawdown: d,
                        percent,
                    }),
                    Err(e) => {
                        eprintln!("Query failed for '{label}' ({} stage): {e}", e.stage());
                        None
                    }
                })
                .collect();
            let backstops = percentiles
                .iter()
                .filter_map(|&p| match engine.backstop(&label, p) {
                    Ok(drawdown) => Some(BackstopView {
                        percentile: p,
                        drawdown,
                    }),
                    Err(e) => {
                        eprintln!("Query failed for '{label}' ({} stage): {e}", e.stage());
                        None
                    }
                })
                .collect();
            ResultView {
                wager: stored.label.key.wager,
                partial: stored.label.partial,
                simulations: stored.record.simulations,
                statistics: stored.record.summary_rows().into_iter().collect(),
                drawdown_odds,
                backstops,
                label,
            }
        })
        .collect()
}
