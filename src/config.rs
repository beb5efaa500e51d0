//! Run configuration.
//!
//! Settings come from an optional TOML file and from the command line. Both
//! are parsed into a [`RawConfig`] of optional fields; the command line is
//! overlaid on the file, and [`RawConfig::resolve`] fills in defaults and
//! validates. Example file:
//!
//! ```toml
//! [sweep]
//! threads_min = 1
//! threads_max = 16
//! payload_min = 64
//! payload_max = 256
//!
//! [variants]
//! jemalloc = true
//! clwb = true
//!
//! [paths]
//! build_dir = "build"
//! preload_library = "/usr/lib/libjemalloc.so"
//!
//! [pinning]
//! numa_node = 0
//! ```

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use log::warn;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::runner::{Pinning, RunnerOptions};
use crate::sampler::DEFAULT_REPEAT;
use crate::variant::VariantFlags;

pub const DEFAULT_CONFIG_FILE: &str = "allocsweep.toml";

pub const DEFAULT_THREADS_MIN: u32 = 1;
pub const DEFAULT_THREADS_MAX: u32 = 10;
pub const DEFAULT_PAYLOAD: u64 = 64;
pub const DEFAULT_RECOVERY_ITERATIONS: u32 = 20;
pub const DEFAULT_PRELOAD_LIBRARY: &str = "/usr/lib/libjemalloc.so";
pub const DEFAULT_PIN_COMMAND: &str = "hwloc-bind";
pub const DEFAULT_NUMA_NODE: u32 = 1;

/// Sweep bounds and enabled variants. Built once per run, never mutated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Configuration {
    threads_min: u32,
    threads_max: u32,
    payload_min: u64,
    payload_max: u64,
    variants: VariantFlags,
}

impl Configuration {
    /// `payload_max` below `payload_min` is raised to `payload_min` with a
    /// warning. An empty thread range is rejected.
    pub fn new(
        threads_min: u32,
        threads_max: u32,
        payload_min: u64,
        payload_max: u64,
        variants: VariantFlags,
    ) -> Result<Self> {
        if threads_min > threads_max {
            return Err(Error::Config(format!(
                "threads_min ({threads_min}) must be <= threads_max ({threads_max})"
            )));
        }
        let payload_max = if payload_max < payload_min {
            warn!("payload_max ({payload_max}) < payload_min ({payload_min}), using {payload_min}");
            payload_min
        } else {
            payload_max
        };
        Ok(Self {
            threads_min,
            threads_max,
            payload_min,
            payload_max,
            variants,
        })
    }

    pub fn threads_min(&self) -> u32 {
        self.threads_min
    }

    pub fn threads_max(&self) -> u32 {
        self.threads_max
    }

    pub fn payload_min(&self) -> u64 {
        self.payload_min
    }

    pub fn payload_max(&self) -> u64 {
        self.payload_max
    }

    /// Whether the preloaded alternate allocator takes part in comparisons.
    pub fn use_preload_variant(&self) -> bool {
        self.variants.jemalloc
    }

    pub fn variants(&self) -> &VariantFlags {
        &self.variants
    }
}

#[derive(Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SweepSection {
    pub threads_min: Option<u32>,
    pub threads_max: Option<u32>,
    pub payload_min: Option<u64>,
    pub payload_max: Option<u64>,
    /// Runs averaged per sweep point.
    pub repeat: Option<usize>,
    /// Upper bound of the recovery sweep (iterations of 10k allocations).
    pub recovery_iterations: Option<u32>,
}

#[derive(Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct VariantSection {
    pub jemalloc: Option<bool>,
    pub nvm: Option<bool>,
    pub clflushopt: Option<bool>,
    pub clwb: Option<bool>,
    pub nofence: Option<bool>,
    pub noflush: Option<bool>,
    pub none: Option<bool>,
}

#[derive(Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PathSection {
    pub build_dir: Option<PathBuf>,
    pub library_dir: Option<PathBuf>,
    pub preload_library: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub plot_dir: Option<PathBuf>,
}

#[derive(Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PinningSection {
    pub enabled: Option<bool>,
    pub command: Option<String>,
    pub numa_node: Option<u32>,
}

#[derive(Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub sweep: SweepSection,
    pub variants: VariantSection,
    pub paths: PathSection,
    pub pinning: PinningSection,
}

/// Copy every `Some` field of `$src` over `$dst`.
macro_rules! overlay_fields {
    ($dst:expr, $src:expr; $($field:ident),+ $(,)?) => {
        $(
            if $src.$field.is_some() {
                $dst.$field = $src.$field;
            }
        )+
    };
}

/// Fully resolved settings for one run.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub configuration: Configuration,
    pub runner: RunnerOptions,
    pub repeat: NonZeroUsize,
    pub recovery_iterations: u32,
    pub cache_dir: PathBuf,
    pub plot_dir: PathBuf,
}

impl RawConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Fields set in `other` replace the ones in `self`.
    pub fn overlay(mut self, other: RawConfig) -> Self {
        overlay_fields!(self.sweep, other.sweep;
            threads_min, threads_max, payload_min, payload_max, repeat, recovery_iterations);
        overlay_fields!(self.variants, other.variants;
            jemalloc, nvm, clflushopt, clwb, nofence, noflush, none);
        overlay_fields!(self.paths, other.paths;
            build_dir, library_dir, preload_library, cache_dir, plot_dir);
        overlay_fields!(self.pinning, other.pinning; enabled, command, numa_node);
        self
    }

    /// Apply defaults and validate. Relative paths are taken from `base`.
    pub fn resolve(&self, base: &Path) -> Result<Settings> {
        let sweep = &self.sweep;
        let v = &self.variants;
        let variants = VariantFlags {
            jemalloc: v.jemalloc.unwrap_or(false),
            nvm: v.nvm.unwrap_or(true),
            clflushopt: v.clflushopt.unwrap_or(false),
            clwb: v.clwb.unwrap_or(false),
            nofence: v.nofence.unwrap_or(false),
            noflush: v.noflush.unwrap_or(false),
            none: v.none.unwrap_or(false),
        };
        let configuration = Configuration::new(
            sweep.threads_min.unwrap_or(DEFAULT_THREADS_MIN),
            sweep.threads_max.unwrap_or(DEFAULT_THREADS_MAX),
            sweep.payload_min.unwrap_or(DEFAULT_PAYLOAD),
            sweep.payload_max.unwrap_or(DEFAULT_PAYLOAD),
            variants,
        )?;

        let repeat = match sweep.repeat {
            None => DEFAULT_REPEAT,
            Some(n) => NonZeroUsize::new(n)
                .ok_or_else(|| Error::Config("repeat must be > 0".to_string()))?,
        };
        let recovery_iterations = sweep
            .recovery_iterations
            .unwrap_or(DEFAULT_RECOVERY_ITERATIONS);
        if recovery_iterations == 0 {
            return Err(Error::Config("recovery_iterations must be > 0".to_string()));
        }

        let path = |p: &Option<PathBuf>, default: &str| {
            base.join(p.as_deref().unwrap_or(Path::new(default)))
        };
        let pinning = if self.pinning.enabled.unwrap_or(true) {
            Some(Pinning {
                command: self
                    .pinning
                    .command
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PIN_COMMAND.to_string()),
                node: self.pinning.numa_node.unwrap_or(DEFAULT_NUMA_NODE),
            })
        } else {
            None
        };

        Ok(Settings {
            configuration,
            runner: RunnerOptions {
                build_dir: path(&self.paths.build_dir, "build"),
                library_dir: path(&self.paths.library_dir, ".."),
                preload_library: path(&self.paths.preload_library, DEFAULT_PRELOAD_LIBRARY),
                pinning,
            },
            repeat,
            recovery_iterations,
            cache_dir: path(&self.paths.cache_dir, "cached"),
            plot_dir: path(&self.paths.plot_dir, "plots"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> &'static Path {
        Path::new("/work")
    }

    #[test]
    fn test_defaults() {
        let s = RawConfig::default().resolve(base()).unwrap();
        let c = s.configuration;
        assert_eq!((c.threads_min(), c.threads_max()), (1, 10));
        assert_eq!((c.payload_min(), c.payload_max()), (64, 64));
        assert!(!c.use_preload_variant());
        assert!(c.variants().nvm);
        assert_eq!(s.repeat.get(), 5);
        assert_eq!(s.recovery_iterations, 20);
        assert_eq!(s.cache_dir, Path::new("/work/cached"));
        assert_eq!(s.plot_dir, Path::new("/work/plots"));
        assert_eq!(s.runner.build_dir, Path::new("/work/build"));
        assert_eq!(s.runner.library_dir, Path::new("/work/.."));
        assert_eq!(s.runner.preload_library, Path::new(DEFAULT_PRELOAD_LIBRARY));
        assert_eq!(
            s.runner.pinning,
            Some(Pinning {
                command: "hwloc-bind".to_string(),
                node: 1
            })
        );
    }

    #[test]
    fn test_payload_max_clamped_to_min() {
        let c = Configuration::new(1, 10, 128, 64, VariantFlags::baseline_only()).unwrap();
        assert_eq!(c.payload_min(), 128);
        assert_eq!(c.payload_max(), 128);
    }

    #[test]
    fn test_payload_clamp_through_resolve() {
        let raw = RawConfig::from_toml("[sweep]\npayload_min = 128\npayload_max = 64\n").unwrap();
        let c = raw.resolve(base()).unwrap().configuration;
        assert_eq!(c.payload_max(), 128);
    }

    #[test]
    fn test_empty_thread_range_rejected() {
        let err = Configuration::new(5, 4, 64, 64, VariantFlags::baseline_only()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_single_point_range_allowed() {
        assert!(Configuration::new(4, 4, 64, 64, VariantFlags::baseline_only()).is_ok());
    }

    #[test]
    fn test_zero_repeat_rejected() {
        let raw = RawConfig::from_toml("[sweep]\nrepeat = 0\n").unwrap();
        assert!(matches!(raw.resolve(base()), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(RawConfig::from_toml("[sweep]\nthreads = 4\n").is_err());
    }

    #[test]
    fn test_full_file() {
        let raw = RawConfig::from_toml(
            r#"
            [sweep]
            threads_min = 2
            threads_max = 8
            repeat = 3
            recovery_iterations = 5

            [variants]
            jemalloc = true
            nvm = false
            clwb = true

            [paths]
            build_dir = "/opt/nvm/build"
            cache_dir = "results"

            [pinning]
            enabled = false
            "#,
        )
        .unwrap();
        let s = raw.resolve(base()).unwrap();
        assert_eq!(s.configuration.threads_min(), 2);
        assert_eq!(s.configuration.threads_max(), 8);
        assert!(s.configuration.use_preload_variant());
        assert!(!s.configuration.variants().nvm);
        assert!(s.configuration.variants().clwb);
        assert_eq!(s.repeat.get(), 3);
        assert_eq!(s.recovery_iterations, 5);
        assert_eq!(s.runner.build_dir, Path::new("/opt/nvm/build"));
        assert_eq!(s.cache_dir, Path::new("/work/results"));
        assert_eq!(s.runner.pinning, None);
    }

    #[test]
    fn test_overlay_prefers_later_values() {
        let file = RawConfig::from_toml(
            "[sweep]\nthreads_max = 4\npayload_min = 32\n[pinning]\nnuma_node = 0\n",
        )
        .unwrap();
        let mut cli = RawConfig::default();
        cli.sweep.threads_max = Some(12);
        cli.variants.clflushopt = Some(true);

        let merged = file.overlay(cli);
        assert_eq!(merged.sweep.threads_max, Some(12));
        assert_eq!(merged.sweep.payload_min, Some(32));
        assert_eq!(merged.variants.clflushopt, Some(true));
        assert_eq!(merged.pinning.numa_node, Some(0));
    }

    #[test]
    fn test_load_missing_file() {
        let err = RawConfig::load(Path::new("/nonexistent/allocsweep.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
