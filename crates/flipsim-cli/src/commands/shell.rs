use std::io::{BufRead, Write};
use std::thread::JoinHandle;

use flipsim_core::{RunHandle, RunRequest, Session};

use super::SimArgs;

const HELP: &str = "\
Commands:
  run FLIPS SIMS W1,W2,...   start a run in the background
  labels                     list stored results, oldest first
  stats [LABEL]              statistics for LABEL (default: latest)
  odds LABEL|- DRAWDOWN      chance of a drawdown worse than DRAWDOWN
  backstop LABEL|- P         drawdown at percentile P (0-100)
  cancel                     stop the running simulation
  reset                      cancel and clear all stored results
  help                       show this text
  quit                       exit";

/// One parsed shell line. `None` labels select the latest result.
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Run(RunRequest),
    Labels,
    Stats(Option<String>),
    Odds { label: Option<String>, drawdown: f64 },
    Backstop { label: Option<String>, percentile: f64 },
    Cancel,
    Reset,
    Help,
    Quit,
    Empty,
}

/// Labels contain spaces, so a label argument is every word between the
/// command and its trailing number.
fn label_and_number(words: &[&str], usage: &str) -> Result<(Option<String>, f64), String> {
    let Some((last, label_words)) = words.split_last() else {
        return Err(format!("usage: {usage}"));
    };
    if label_words.is_empty() {
        return Err(format!("usage: {usage}"));
    }
    let number = last
        .parse::<f64>()
        .map_err(|_| format!("'{last}' is not a number (usage: {usage})"))?;
    let label = label_words.join(" ");
    let label = if label == "-" { None } else { Some(label) };
    Ok((label, number))
}

pub fn parse_command(line: &str) -> Result<ShellCommand, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&command, rest)) = words.split_first() else {
        return Ok(ShellCommand::Empty);
    };

    match command {
        "run" => {
            let [flips, sims, wagers] = rest else {
                return Err("usage: run FLIPS SIMS W1,W2,...".to_string());
            };
            let flips = flips
                .parse::<usize>()
                .map_err(|_| format!("invalid flip count '{flips}'"))?;
            let sims = sims
                .parse::<usize>()
                .map_err(|_| format!("invalid simulation count '{sims}'"))?;
            let wagers = super::parse_wagers(wagers)?;
            Ok(ShellCommand::Run(RunRequest::new(flips, sims, wagers)))
        }
        "labels" | "ls" => Ok(ShellCommand::Labels),
        "stats" => {
            let label = rest.join(" ");
            Ok(ShellCommand::Stats(if label.is_empty() || label == "-" {
                None
            } else {
                Some(label)
            }))
        }
        "odds" => {
            let (label, drawdown) = label_and_number(rest, "odds LABEL|- DRAWDOWN")?;
            Ok(ShellCommand::Odds { label, drawdown })
        }
        "backstop" => {
            let (label, percentile) = label_and_number(rest, "backstop LABEL|- P")?;
            Ok(ShellCommand::Backstop { label, percentile })
        }
        "cancel" => Ok(ShellCommand::Cancel),
        "reset" => Ok(ShellCommand::Reset),
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "exit" => Ok(ShellCommand::Quit),
        other => Err(format!("unknown command '{other}' (try 'help')")),
    }
}

/// Drains a run's progress to stderr and reports how it ended.
fn watch(handle: RunHandle) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut last_decile = None;
        for progress in handle.progress().iter() {
            let decile = (progress.percent() / 10.0).floor() as u32;
            if last_decile != Some(decile) {
                eprintln!("[run] {:>5.1}%", progress.percent());
                last_decile = Some(decile);
            }
        }
        match handle.join() {
            Ok(report) => {
                let note = if report.is_partial() { " (partial)" } else { "" };
                eprintln!(
                    "[run] finished{note} in {:.2}s: {}",
                    report.elapsed.as_secs_f64(),
                    report.labels().join(", ")
                );
            }
            Err(e) => eprintln!("[run] failed ({} stage): {e}", e.stage()),
        }
    })
}

fn resolve_label(session: &Session, label: Option<String>) -> Option<String> {
    match label {
        Some(label) => Some(label),
        None => {
            let latest = session.latest().map(|entry| entry.name());
            if latest.is_none() {
                println!("No results stored yet.");
            }
            latest
        }
    }
}

pub fn run(args: &SimArgs) {
    let config = super::build_config(args).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(2);
    });
    println!("flipsim shell (generator: {})", config.generator);
    println!("Type 'help' for commands.");
    let session = Session::new(config);
    let mut current: Option<JoinHandle<()>> = None;

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("flipsim> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                eprintln!("Error reading input: {e}");
                break;
            }
            None => break,
        };

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        match command {
            ShellCommand::Empty => {}
            ShellCommand::Help => println!("{HELP}"),
            ShellCommand::Quit => break,
            ShellCommand::Run(request) => {
                if current.as_ref().is_some_and(|w| !w.is_finished()) {
                    println!("A run is already in progress; 'cancel' it first.");
                    continue;
                }
                if let Err(e) = request.validate() {
                    println!("{e}");
                    continue;
                }
                current = Some(watch(session.spawn_run(request)));
            }
            ShellCommand::Labels => {
                let labels = session.labels();
                if labels.is_empty() {
                    println!("No results stored yet.");
                }
                for label in labels {
                    println!("  {label}");
                }
            }
            ShellCommand::Stats(label) => {
                let Some(label) = resolve_label(&session, label) else {
                    continue;
                };
                match session.statistics(&label) {
                    Ok(record) => super::print_statistics(&label, &record),
                    Err(e) => println!("{e}"),
                }
            }
            ShellCommand::Odds { label, drawdown } => {
                let Some(label) = resolve_label(&session, label) else {
                    continue;
                };
                match session.drawdown_percentile(&label, drawdown) {
                    Ok(pct) => println!(
                        "{label}: P(drawdown worse than {:.2}) = {pct:.2}%",
                        -drawdown.abs()
                    ),
                    Err(e) => println!("{e}"),
                }
            }
            ShellCommand::Backstop { label, percentile } => {
                let Some(label) = resolve_label(&session, label) else {
                    continue;
                };
                match session.backstop(&label, percentile) {
                    Ok(value) => {
                        println!("{label}: {percentile:.1}th percentile drawdown = {value:.2}")
                    }
                    Err(e) => println!("{e}"),
                }
            }
            ShellCommand::Cancel => {
                session.cancel();
                println!("Cancellation requested.");
            }
            ShellCommand::Reset => {
                session.reset();
                if let Some(watcher) = current.take() {
                    let _ = watcher.join();
                }
                println!("Store cleared.");
            }
        }
    }

    session.cancel();
    if let Some(watcher) = current {
        let _ = watcher.join();
    }
}
