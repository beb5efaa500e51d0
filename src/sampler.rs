//! Fixed-count averaging of repeated benchmark runs.

use std::num::NonZeroUsize;

use crate::error::Result;
use crate::runner::{Runner, SweepPoint};

/// Runs per sweep point unless configured otherwise.
pub const DEFAULT_REPEAT: NonZeroUsize = match NonZeroUsize::new(5) {
    Some(n) => n,
    None => unreachable!(),
};

/// Invokes a [`Runner`] `repeat` times with identical arguments and reduces
/// the samples to their arithmetic mean. No outlier rejection.
pub struct RepeatedSampler<R> {
    runner: R,
    repeat: NonZeroUsize,
}

impl<R: Runner> RepeatedSampler<R> {
    pub fn new(runner: R, repeat: NonZeroUsize) -> Self {
        Self { runner, repeat }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Mean of `repeat` runs of `point`.
    pub fn sample(&mut self, point: &SweepPoint, preload: bool) -> Result<f64> {
        let mut sum = 0.0;
        for _ in 0..self.repeat.get() {
            sum += self.runner.invoke(point, preload)?;
        }
        Ok(sum / self.repeat.get() as f64)
    }

    /// Mean of `repeat` runs of `point`, divided by `divisor` to express it in
    /// a coarser unit (1000.0 turns microseconds into milliseconds).
    pub fn sample_scaled(
        &mut self,
        point: &SweepPoint,
        preload: bool,
        divisor: f64,
    ) -> Result<f64> {
        Ok(self.sample(point, preload)? / divisor)
    }
}
