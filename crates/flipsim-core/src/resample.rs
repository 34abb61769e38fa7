//! Parallel bootstrap draws.
//!
//! Each bootstrap draw is independent, so draws are split into contiguous
//! batches and each batch runs on a scoped worker thread with its own RNG. No
//! mutable state is shared between workers; results are returned in worker
//! order so a fixed seed and worker count reproduce the same output.

use rand::SeedableRng;
use rand::rngs::StdRng;

/// Worker count and seeding policy for a batch of bootstrap draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResamplePlan {
    workers: usize,
    seed: Option<u64>,
}

impl ResamplePlan {
    pub fn new(workers: usize, seed: Option<u64>) -> Self {
        Self {
            workers: workers.max(1),
            seed,
        }
    }

    /// Single worker, fixed seed. Fully deterministic.
    pub fn seeded(seed: u64) -> Self {
        Self::new(1, Some(seed))
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Derive an independent plan for another resampling stream.
    ///
    /// Two bootstraps computed from the same seeded plan would otherwise draw
    /// identical indices.
    pub fn fork(&self, stream: u64) -> Self {
        Self {
            workers: self.workers,
            seed: self.seed.map(|s| splitmix64(s ^ splitmix64(stream))),
        }
    }

    fn rng_for(&self, worker: usize) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(splitmix64(seed.wrapping_add(worker as u64))),
            None => StdRng::from_os_rng(),
        }
    }

    /// Run `draws` bootstrap draws, split across the plan's workers.
    ///
    /// `work(rng, count)` performs `count` draws and returns that batch's
    /// result. Batches are returned in worker order. A panic in any worker is
    /// propagated to the caller.
    pub fn run<T, F>(&self, draws: usize, work: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&mut StdRng, usize) -> T + Sync,
    {
        let workers = self.workers.min(draws).max(1);
        let base = draws / workers;
        let extra = draws % workers;
        let batch = |i: usize| base + usize::from(i < extra);

        if workers == 1 {
            let mut rng = self.rng_for(0);
            return vec![work(&mut rng, draws)];
        }

        std::thread::scope(|s| {
            let work = &work;
            let handles: Vec<_> = (0..workers)
                .map(|i| {
                    let mut rng = self.rng_for(i);
                    let count = batch(i);
                    s.spawn(move || work(&mut rng, count))
                })
                .collect();

            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}

impl Default for ResamplePlan {
    fn default() -> Self {
        Self::new(crate::config::default_workers(), None)
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn draw_all(plan: &ResamplePlan, draws: usize) -> Vec<u32> {
        plan.run(draws, |rng, count| {
            (0..count).map(|_| rng.random_range(0..1000)).collect::<Vec<u32>>()
        })
        .into_iter()
        .flatten()
        .collect()
    }

    #[test]
    fn test_batches_cover_every_draw() {
        for workers in [1, 2, 3, 8] {
            let plan = ResamplePlan::new(workers, Some(1));
            let counts = plan.run(101, |_, count| count);
            assert_eq!(counts.iter().sum::<usize>(), 101, "workers={workers}");
        }
    }

    #[test]
    fn test_more_workers_than_draws() {
        let plan = ResamplePlan::new(16, Some(1));
        let counts = plan.run(3, |_, count| count);
        assert_eq!(counts, vec![1, 1, 1]);
    }

    #[test]
    fn test_zero_draws() {
        let plan = ResamplePlan::new(4, Some(1));
        let counts = plan.run(0, |_, count| count);
        assert_eq!(counts, vec![0]);
    }

    #[test]
    fn test_seeded_plan_is_reproducible() {
        let plan = ResamplePlan::new(4, Some(99));
        assert_eq!(draw_all(&plan, 500), draw_all(&plan, 500));
    }

    #[test]
    fn test_fork_changes_stream() {
        let plan = ResamplePlan::seeded(5);
        assert_ne!(draw_all(&plan, 64), draw_all(&plan.fork(1), 64));
        assert_eq!(draw_all(&plan.fork(1), 64), draw_all(&plan.fork(1), 64));
    }

    #[test]
    fn test_unseeded_fork_stays_unseeded() {
        let plan = ResamplePlan::new(2, None);
        assert_eq!(plan.fork(3).seed(), None);
        assert_eq!(plan.fork(3).workers(), 2);
    }

    #[test]
    fn test_workers_clamped_to_one() {
        assert_eq!(ResamplePlan::new(0, None).workers(), 1);
    }
}
