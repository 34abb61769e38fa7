//! Reference outcome generator.
//!
//! Reads request lines (`N`) from stdin and answers each with `N` lines of
//! `1` or `-1` followed by one blank line. Exits when stdin closes.

use std::io::{self, BufRead, BufWriter, Write};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn run(seed: Option<u64>, win_probability: f64) {
    if !(0.0..=1.0).contains(&win_probability) {
        eprintln!("Error: win probability {win_probability} is outside [0, 1]");
        std::process::exit(2);
    }
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let writer = BufWriter::new(stdout.lock());
    match serve(stdin.lock(), writer, &mut rng, win_probability) {
        Ok(chunks) => log::debug!("generator served {chunks} chunks"),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            log::debug!("generator output closed by reader");
        }
        Err(e) => {
            eprintln!("Generator I/O error: {e}");
            std::process::exit(1);
        }
    }
}

/// Answer requests until `reader` is exhausted. Returns the number of chunks served.
///
/// An unparseable request is answered with an empty chunk so the reader sees
/// a short response instead of hanging.
pub fn serve<R, W, G>(
    reader: R,
    mut writer: W,
    rng: &mut G,
    win_probability: f64,
) -> io::Result<usize>
where
    R: BufRead,
    W: Write,
    G: Rng,
{
    let mut served = 0usize;
    for line in reader.lines() {
        let line = line?;
        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        match request.parse::<usize>() {
            Ok(n) => {
                for _ in 0..n {
                    let outcome = if rng.random_bool(win_probability) { "1" } else { "-1" };
                    writeln!(writer, "{outcome}")?;
                }
            }
            Err(_) => log::warn!("ignoring invalid request {request:?}"),
        }
        writeln!(writer)?;
        writer.flush()?;
        served += 1;
    }
    Ok(served)
}
