//! allocsweep: sweep-and-cache driver for allocator benchmarks.
//!
//! Runs pre-built benchmark binaries once per allocator variant across a
//! range of thread counts, averages repeated runs, caches every finished
//! series on disk and renders one comparison chart per benchmark family.
//!
//! Layers, leaf to root:
//! - [`cache`] stores finished series by exact fingerprint
//! - [`runner`] launches one benchmark process and parses its output
//! - [`sampler`] averages a fixed number of runs
//! - [`sweep`] walks a parameter range through the cache
//! - [`compare`] sweeps each enabled [`variant`] of a family
//! - [`plot`] turns a comparison into an SVG chart
//!
//! # Usage
//!
//! ```no_run
//! use allocsweep::cache::DirStore;
//! use allocsweep::compare::VariantComparator;
//! use allocsweep::config::RawConfig;
//! use allocsweep::runner::CommandRunner;
//! use allocsweep::sampler::RepeatedSampler;
//! use allocsweep::sweep::{SweepController, THREAD_SWEEP_DIVISOR};
//! use allocsweep::variant::STANDARD_VARIANTS;
//!
//! let settings = RawConfig::default().resolve(std::path::Path::new("."))?;
//! let runner = CommandRunner::new(settings.runner.clone());
//! let sampler = RepeatedSampler::new(runner, settings.repeat);
//! let controller = SweepController::new(DirStore::new(&settings.cache_dir), sampler)
//!     .with_thread_divisor(THREAD_SWEEP_DIVISOR);
//! let mut comparator = VariantComparator::new(controller, false);
//! let config = &settings.configuration;
//! let result = comparator.compare_family("fastalloc", config, STANDARD_VARIANTS)?;
//! # Ok::<(), allocsweep::Error>(())
//! ```

pub mod cache;
pub mod compare;
pub mod config;
pub mod error;
pub mod plot;
pub mod runner;
pub mod sampler;
pub mod sweep;
pub mod variant;

pub use error::{Error, Result};
