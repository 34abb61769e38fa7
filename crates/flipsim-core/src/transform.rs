//! Raw outcomes → return tensor → per-simulation drawdowns.
//!
//! The raw stream is laid out row-major as `(simulations, flips, wagers)` with
//! the wager axis varying fastest. Every element becomes
//! `wager[k] * (raw + fee)`; the drawdown of a `(simulation, wager)` pair is
//! the minimum of the running sum of its returns along the flip axis.

use crate::error::TransformError;

/// Returns per `(simulation, flip, wager)`, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnTensor {
    simulations: usize,
    flips: usize,
    wagers: usize,
    values: Vec<f64>,
}

impl ReturnTensor {
    /// `(simulations, flips, wagers)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.simulations, self.flips, self.wagers)
    }

    pub fn get(&self, simulation: usize, flip: usize, wager: usize) -> f64 {
        self.values[(simulation * self.flips + flip) * self.wagers + wager]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Every return in one wager column, across all simulations and flips.
    pub fn wager_values(&self, wager: usize) -> impl Iterator<Item = f64> + '_ {
        self.values
            .iter()
            .skip(wager)
            .step_by(self.wagers)
            .copied()
    }
}

/// Shape a flat outcome stream into a return tensor.
///
/// Takes ownership of the stream and rewrites it in place, so the tensor
/// occupies the buffer the outcomes arrived in. Fails instead of truncating
/// or padding when the stream length does not match
/// `simulations * flips * wagers.len()`.
pub fn transform(
    mut raw: Vec<f64>,
    simulations: usize,
    flips: usize,
    wagers: &[i64],
    fee: f64,
) -> Result<ReturnTensor, TransformError> {
    if simulations == 0 {
        return Err(TransformError::EmptyAxis("simulations"));
    }
    if flips == 0 {
        return Err(TransformError::EmptyAxis("flips"));
    }
    if wagers.is_empty() {
        return Err(TransformError::EmptyAxis("wagers"));
    }

    let width = wagers.len();
    let expected = simulations
        .checked_mul(flips)
        .and_then(|n| n.checked_mul(width));
    if expected != Some(raw.len()) {
        return Err(TransformError::ShapeMismatch {
            expected: expected.unwrap_or(usize::MAX),
            actual: raw.len(),
            simulations,
            flips,
            wagers: width,
        });
    }

    let scale: Vec<f64> = wagers.iter().map(|&w| w as f64).collect();
    for row in raw.chunks_exact_mut(width) {
        for (value, &wager) in row.iter_mut().zip(&scale) {
            *value = wager * (*value + fee);
        }
    }

    Ok(ReturnTensor {
        simulations,
        flips,
        wagers: width,
        values: raw,
    })
}

/// Worst cumulative position per `(simulation, wager)`, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawdownMatrix {
    simulations: usize,
    wagers: usize,
    values: Vec<f64>,
}

impl DrawdownMatrix {
    /// `(simulations, wagers)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.simulations, self.wagers)
    }

    pub fn get(&self, simulation: usize, wager: usize) -> f64 {
        self.values[simulation * self.wagers + wager]
    }

    /// Drawdowns of one wager across all simulations: the sample handed to the
    /// statistics engine.
    pub fn column(&self, wager: usize) -> Vec<f64> {
        self.values
            .iter()
            .skip(wager)
            .step_by(self.wagers)
            .copied()
            .collect()
    }
}

/// Minimum of the running sum along the flip axis, per `(simulation, wager)`.
pub fn drawdown(tensor: &ReturnTensor) -> DrawdownMatrix {
    let (simulations, flips, wagers) = tensor.shape();
    let mut values = Vec::with_capacity(simulations * wagers);
    let mut running = vec![0.0f64; wagers];
    let mut worst = vec![0.0f64; wagers];

    for sim in tensor.values.chunks_exact(flips * wagers) {
        running.fill(0.0);
        worst.fill(f64::INFINITY);
        for flip in sim.chunks_exact(wagers) {
            for ((total, low), &ret) in running.iter_mut().zip(worst.iter_mut()).zip(flip) {
                *total += ret;
                if *total < *low {
                    *low = *total;
                }
            }
        }
        values.extend_from_slice(&worst);
    }

    DrawdownMatrix {
        simulations,
        wagers,
        values,
    }
}
