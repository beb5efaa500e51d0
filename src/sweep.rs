//! One-dimensional parameter sweeps with whole-series caching.
//!
//! A sweep walks its parameter from `lo` to `hi` inclusive, in ascending
//! order, averaging each point with the [`RepeatedSampler`]. The finished
//! series is written to the [`ResultStore`] exactly once; an interrupted
//! sweep leaves nothing behind. A later sweep with the same fingerprint is
//! answered from the store without launching anything.

use log::debug;

use crate::cache::{Fingerprint, ResultSeries, ResultStore};
use crate::config::Configuration;
use crate::error::Result;
use crate::runner::{Runner, SweepPoint};
use crate::sampler::RepeatedSampler;

/// Thread sweeps report milliseconds; the binaries print microseconds.
pub const THREAD_SWEEP_DIVISOR: f64 = 1000.0;

/// Bounds and arguments of one sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepPlan {
    pub binary: String,
    pub lo: u32,
    pub hi: u32,
    pub payload_min: u64,
    pub payload_max: u64,
    pub preload: bool,
    /// Applied to every averaged point before it is stored.
    pub divisor: f64,
}

impl SweepPlan {
    /// Thread count from `threads_min` to `threads_max`.
    pub fn threads(binary: &str, config: &Configuration, preload: bool) -> Self {
        Self {
            binary: binary.to_string(),
            lo: config.threads_min(),
            hi: config.threads_max(),
            payload_min: config.payload_min(),
            payload_max: config.payload_max(),
            preload,
            divisor: 1.0,
        }
    }

    /// Iteration count from 1 to `max_iterations`. The recovery binary runs
    /// single-threaded and never uses the preloaded allocator.
    pub fn recovery(binary: &str, config: &Configuration, max_iterations: u32) -> Self {
        Self {
            binary: binary.to_string(),
            lo: 1,
            hi: max_iterations,
            payload_min: config.payload_min(),
            payload_max: config.payload_max(),
            preload: false,
            divisor: 1.0,
        }
    }

    pub fn scaled(mut self, divisor: f64) -> Self {
        self.divisor = divisor;
        self
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::new(
            &self.binary,
            self.lo,
            self.hi,
            self.payload_min,
            self.payload_max,
            self.preload,
        )
    }

    /// Number of points; zero when `lo > hi`.
    pub fn len(&self) -> usize {
        if self.lo > self.hi {
            0
        } else {
            (self.hi - self.lo) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn points(&self) -> impl Iterator<Item = SweepPoint> + '_ {
        (self.lo..=self.hi).map(move |parameter| SweepPoint {
            binary: self.binary.clone(),
            parameter,
            payload_min: self.payload_min,
            payload_max: self.payload_max,
        })
    }
}

pub struct SweepController<S, R> {
    store: S,
    sampler: RepeatedSampler<R>,
    thread_divisor: f64,
}

impl<S: ResultStore, R: Runner> SweepController<S, R> {
    /// Thread sweeps keep raw values until [`with_thread_divisor`] says
    /// otherwise.
    ///
    /// [`with_thread_divisor`]: SweepController::with_thread_divisor
    pub fn new(store: S, sampler: RepeatedSampler<R>) -> Self {
        Self {
            store,
            sampler,
            thread_divisor: 1.0,
        }
    }

    pub fn with_thread_divisor(mut self, divisor: f64) -> Self {
        self.thread_divisor = divisor;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sampler(&self) -> &RepeatedSampler<R> {
        &self.sampler
    }

    /// Sweep the thread count of `binary` over the configured range.
    pub fn run_sweep(
        &mut self,
        binary: &str,
        config: &Configuration,
        preload: bool,
        ignore_cache: bool,
    ) -> Result<ResultSeries> {
        let plan = SweepPlan::threads(binary, config, preload).scaled(self.thread_divisor);
        self.run(&plan, ignore_cache)
    }

    /// Sweep the recovery benchmark over `1..=max_iterations`.
    pub fn run_recovery(
        &mut self,
        binary: &str,
        config: &Configuration,
        max_iterations: u32,
        ignore_cache: bool,
    ) -> Result<ResultSeries> {
        let plan = SweepPlan::recovery(binary, config, max_iterations);
        self.run(&plan, ignore_cache)
    }

    pub fn run(&mut self, plan: &SweepPlan, ignore_cache: bool) -> Result<ResultSeries> {
        let fingerprint = plan.fingerprint();
        if !ignore_cache && let Some(series) = self.store.load(&fingerprint)? {
            debug!("cache hit for {fingerprint}");
            return Ok(series);
        }
        debug!("running {} points for {fingerprint}", plan.len());

        let mut series = Vec::with_capacity(plan.len());
        for point in plan.points() {
            let value = self
                .sampler
                .sample_scaled(&point, plan.preload, plan.divisor)?;
            debug!("{} @ {}: {value}", point.binary, point.parameter);
            series.push(value);
        }

        self.store.store(&fingerprint, &series)?;
        Ok(series)
    }
}
