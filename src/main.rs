use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use allocsweep::cache::DirStore;
use allocsweep::compare::{VariantComparator, recovery_chart};
use allocsweep::config::{
    DEFAULT_CONFIG_FILE, PathSection, PinningSection, RawConfig, SweepSection, VariantSection,
};
use allocsweep::plot::{Plotter, SvgPlotter};
use allocsweep::runner::CommandRunner;
use allocsweep::sampler::RepeatedSampler;
use allocsweep::sweep::{SweepController, THREAD_SWEEP_DIVISOR};
use allocsweep::variant::{FAMILIES, STANDARD_VARIANTS};

/// nvm_malloc benchmarking tool.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML settings file [default: ./allocsweep.toml when present]
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    run_all: bool,
    #[arg(long)]
    run_alloc_free: bool,
    #[arg(long)]
    run_alloc_free_alloc: bool,
    #[arg(long)]
    run_fastalloc: bool,
    #[arg(long)]
    run_linkedlist: bool,
    #[arg(long)]
    run_recovery: bool,

    #[arg(long)]
    threads_min: Option<u32>,
    #[arg(long)]
    threads_max: Option<u32>,
    #[arg(long)]
    payload_min: Option<u64>,
    #[arg(long)]
    payload_max: Option<u64>,
    /// Runs averaged per sweep point [default: 5]
    #[arg(long)]
    repeat: Option<usize>,
    /// Upper bound of the recovery sweep [default: 20]
    #[arg(long)]
    recovery_iterations: Option<u32>,

    /// Include a run with jemalloc preloaded
    #[arg(long)]
    with_jemalloc: bool,
    /// Leave out the default nvm_malloc build
    #[arg(long)]
    skip_nvm: bool,
    #[arg(long)]
    has_clflushopt: bool,
    #[arg(long)]
    has_clwb: bool,
    /// Include a run with disabled fences
    #[arg(long)]
    with_nofence: bool,
    /// Include a run with disabled flushes
    #[arg(long)]
    with_noflush: bool,
    /// Include a run with disabled fences and flushes
    #[arg(long)]
    with_none: bool,

    /// Rerun every sweep and overwrite cached results
    #[arg(long)]
    ignore_cached: bool,

    #[arg(long)]
    numa_node: Option<u32>,
    /// Do not wrap benchmarks in the NUMA pinning command
    #[arg(long)]
    no_pin: bool,
    #[arg(long)]
    build_dir: Option<PathBuf>,
    #[arg(long)]
    library_dir: Option<PathBuf>,
    #[arg(long)]
    preload_library: Option<PathBuf>,
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    #[arg(long)]
    plot_dir: Option<PathBuf>,
}

fn flag(set: bool) -> Option<bool> {
    set.then_some(true)
}

impl Args {
    /// Everything given on the command line, as a config layer.
    fn to_raw(&self) -> RawConfig {
        RawConfig {
            sweep: SweepSection {
                threads_min: self.threads_min,
                threads_max: self.threads_max,
                payload_min: self.payload_min,
                payload_max: self.payload_max,
                repeat: self.repeat,
                recovery_iterations: self.recovery_iterations,
            },
            variants: VariantSection {
                jemalloc: flag(self.with_jemalloc),
                nvm: self.skip_nvm.then_some(false),
                clflushopt: flag(self.has_clflushopt),
                clwb: flag(self.has_clwb),
                nofence: flag(self.with_nofence),
                noflush: flag(self.with_noflush),
                none: flag(self.with_none),
            },
            paths: PathSection {
                build_dir: self.build_dir.clone(),
                library_dir: self.library_dir.clone(),
                preload_library: self.preload_library.clone(),
                cache_dir: self.cache_dir.clone(),
                plot_dir: self.plot_dir.clone(),
            },
            pinning: PinningSection {
                enabled: self.no_pin.then_some(false),
                command: None,
                numa_node: self.numa_node,
            },
        }
    }

    fn runs_family(&self, name: &str) -> bool {
        self.run_all
            || match name {
                "alloc_free" => self.run_alloc_free,
                "alloc_free_alloc" => self.run_alloc_free_alloc,
                "fastalloc" => self.run_fastalloc,
                "linkedlist" => self.run_linkedlist,
                _ => false,
            }
    }
}

fn load_file_config(args: &Args, cwd: &Path) -> Result<RawConfig> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => {
            let default = cwd.join(DEFAULT_CONFIG_FILE);
            if !default.is_file() {
                return Ok(RawConfig::default());
            }
            default
        }
    };
    info!("loading settings from {}", path.display());
    Ok(RawConfig::load(&path)?)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let settings = load_file_config(&args, &cwd)?
        .overlay(args.to_raw())
        .resolve(&cwd)
        .context("invalid settings")?;
    let config = settings.configuration;

    let families: Vec<_> = FAMILIES.iter().filter(|f| args.runs_family(f.name)).collect();
    let recovery = args.run_all || args.run_recovery;
    if families.is_empty() && !recovery {
        warn!("nothing selected, pass --run-all or one of the --run-* flags");
        return Ok(());
    }

    for dir in [&settings.cache_dir, &settings.plot_dir] {
        fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    }

    let runner = CommandRunner::new(settings.runner.clone());
    let sampler = RepeatedSampler::new(runner, settings.repeat);
    let controller = SweepController::new(DirStore::new(&settings.cache_dir), sampler)
        .with_thread_divisor(THREAD_SWEEP_DIVISOR);
    let mut comparator = VariantComparator::new(controller, args.ignore_cached);
    let mut plotter = SvgPlotter::new(&settings.plot_dir);

    for family in families {
        let comparison = comparator
            .compare_family(family.name, &config, STANDARD_VARIANTS)
            .with_context(|| format!("benchmark '{}' failed", family.name))?;
        plotter.render(&comparison.thread_chart(family, &config), family.name)?;
    }

    if recovery {
        let comparison = comparator
            .compare_recovery(&config, settings.recovery_iterations)
            .context("recovery benchmark failed")?;
        plotter.render(
            &recovery_chart(&comparison, settings.recovery_iterations),
            &comparison.family,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_leave_config_untouched() {
        let args = Args::parse_from(["allocsweep"]);
        assert_eq!(args.to_raw(), RawConfig::default());
        assert!(!args.runs_family("fastalloc"));
    }

    #[test]
    fn test_cli_flags_map_to_config() {
        let args = Args::parse_from([
            "allocsweep",
            "--run-fastalloc",
            "--threads-max",
            "4",
            "--payload-min",
            "128",
            "--with-jemalloc",
            "--skip-nvm",
            "--has-clwb",
            "--no-pin",
        ]);
        let raw = args.to_raw();
        assert_eq!(raw.sweep.threads_max, Some(4));
        assert_eq!(raw.sweep.payload_min, Some(128));
        assert_eq!(raw.variants.jemalloc, Some(true));
        assert_eq!(raw.variants.nvm, Some(false));
        assert_eq!(raw.variants.clwb, Some(true));
        assert_eq!(raw.variants.clflushopt, None);
        assert_eq!(raw.pinning.enabled, Some(false));
        assert!(args.runs_family("fastalloc"));
        assert!(!args.runs_family("linkedlist"));

        let settings = raw.resolve(Path::new("/work")).unwrap();
        assert_eq!(settings.configuration.payload_max(), 128);
    }

    #[test]
    fn test_run_all_selects_everything() {
        let args = Args::parse_from(["allocsweep", "--run-all"]);
        assert!(FAMILIES.iter().all(|f| args.runs_family(f.name)));
    }
}
