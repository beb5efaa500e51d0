//! Per-family comparison across allocator variants.

use log::info;

use crate::cache::{ResultSeries, ResultStore};
use crate::config::Configuration;
use crate::error::Result;
use crate::plot::{Chart, Line};
use crate::runner::Runner;
use crate::sweep::SweepController;
use crate::variant::{
    BenchmarkFamily, Dash, LineStyle, RECOVERY_BINARY, RECOVERY_NAME, Selector, VariantSpec,
};

/// One variant's series within a comparison.
#[derive(Clone, Debug, PartialEq)]
pub struct VariantResult {
    pub variant: VariantSpec,
    pub series: ResultSeries,
}

/// Series of every enabled variant of one family, in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub struct Comparison {
    pub family: String,
    pub entries: Vec<VariantResult>,
}

impl Comparison {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, variant: &VariantSpec) -> Option<&ResultSeries> {
        self.entries
            .iter()
            .find(|e| &e.variant == variant)
            .map(|e| &e.series)
    }

    /// `(series, label, style)` lines in declaration order.
    pub fn lines(&self) -> Vec<Line> {
        self.entries
            .iter()
            .map(|e| Line {
                label: e.variant.label.to_string(),
                style: e.variant.style,
                values: e.series.clone(),
            })
            .collect()
    }

    /// Chart against the ascending thread axis of `config`.
    pub fn thread_chart(&self, family: &BenchmarkFamily, config: &Configuration) -> Chart {
        Chart {
            title: family.title.to_string(),
            x_label: "Parallel Threads".to_string(),
            y_label: "Time in ms".to_string(),
            x: (config.threads_min()..=config.threads_max())
                .map(f64::from)
                .collect(),
            lines: self.lines(),
            legend: true,
        }
    }
}

/// The single recovery line.
const RECOVERY_VARIANT: VariantSpec = VariantSpec {
    selector: Selector::Always,
    binary_suffix: "",
    label: "nvm_malloc",
    style: LineStyle::plain(Dash::Solid),
    preload: false,
};

/// Runs one sweep per enabled variant of a family.
pub struct VariantComparator<S, R> {
    controller: SweepController<S, R>,
    ignore_cache: bool,
}

impl<S: ResultStore, R: Runner> VariantComparator<S, R> {
    pub fn new(controller: SweepController<S, R>, ignore_cache: bool) -> Self {
        Self {
            controller,
            ignore_cache,
        }
    }

    pub fn controller(&self) -> &SweepController<S, R> {
        &self.controller
    }

    /// Sweep every variant in `variants` that `config` enables, in order.
    pub fn compare_family(
        &mut self,
        family: &str,
        config: &Configuration,
        variants: &[VariantSpec],
    ) -> Result<Comparison> {
        let mut entries = Vec::new();
        for variant in variants
            .iter()
            .filter(|v| config.variants().selects(v.selector))
        {
            info!("Running '{family}' for {}", variant.label);
            let series = self.controller.run_sweep(
                &variant.binary_name(family),
                config,
                variant.preload,
                self.ignore_cache,
            )?;
            entries.push(VariantResult {
                variant: *variant,
                series,
            });
        }
        Ok(Comparison {
            family: family.to_string(),
            entries,
        })
    }

    /// Sweep the recovery benchmark over `1..=max_iterations`.
    pub fn compare_recovery(
        &mut self,
        config: &Configuration,
        max_iterations: u32,
    ) -> Result<Comparison> {
        info!("Running '{RECOVERY_NAME}' for {}", RECOVERY_VARIANT.label);
        let series =
            self.controller
                .run_recovery(RECOVERY_BINARY, config, max_iterations, self.ignore_cache)?;
        Ok(Comparison {
            family: RECOVERY_NAME.to_string(),
            entries: vec![VariantResult {
                variant: RECOVERY_VARIANT,
                series,
            }],
        })
    }
}

pub fn recovery_chart(comparison: &Comparison, max_iterations: u32) -> Chart {
    Chart {
        title: "nvm_malloc internal recovery".to_string(),
        x_label: "Iterations of 10k allocations".to_string(),
        y_label: "Recovery time in \u{b5}s".to_string(),
        x: (1..=max_iterations).map(f64::from).collect(),
        lines: comparison.lines(),
        legend: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::runner::SweepPoint;
    use crate::sampler::{DEFAULT_REPEAT, RepeatedSampler};
    use crate::variant::{FAMILIES, STANDARD_VARIANTS, VariantFlags};

    /// Records binaries and preload flags, returns the binary name length.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<(String, bool)>,
    }

    impl Runner for Recorder {
        fn invoke(&mut self, point: &SweepPoint, preload: bool) -> Result<f64> {
            self.seen.push((point.binary.clone(), preload));
            Ok(point.binary.len() as f64)
        }
    }

    fn comparator() -> VariantComparator<MemoryStore, Recorder> {
        let controller = SweepController::new(
            MemoryStore::new(),
            RepeatedSampler::new(Recorder::default(), DEFAULT_REPEAT),
        );
        VariantComparator::new(controller, false)
    }

    fn distinct_binaries(cmp: &VariantComparator<MemoryStore, Recorder>) -> Vec<(String, bool)> {
        let mut out: Vec<(String, bool)> = Vec::new();
        for seen in &cmp.controller().sampler().runner().seen {
            if !out.contains(seen) {
                out.push(seen.clone());
            }
        }
        out
    }

    #[test]
    fn test_baseline_only() {
        let config = Configuration::new(1, 2, 64, 64, VariantFlags::baseline_only()).unwrap();
        let mut cmp = comparator();
        let result = cmp
            .compare_family("fastalloc", &config, STANDARD_VARIANTS)
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.entries[0].variant.label, "default malloc");
        assert_eq!(
            distinct_binaries(&cmp),
            [("bench_fastalloc".to_string(), false)]
        );
    }

    #[test]
    fn test_declaration_order_and_preload() {
        let flags = VariantFlags {
            jemalloc: true,
            nvm: true,
            clwb: true,
            ..VariantFlags::baseline_only()
        };
        let config = Configuration::new(1, 1, 64, 64, flags).unwrap();
        let mut cmp = comparator();
        let result = cmp
            .compare_family("linkedlist", &config, STANDARD_VARIANTS)
            .unwrap();
        let labels: Vec<_> = result.entries.iter().map(|e| e.variant.label).collect();
        assert_eq!(
            labels,
            ["default malloc", "jemalloc", "nvm_malloc", "nvm_malloc with CLWB"]
        );
        assert_eq!(
            distinct_binaries(&cmp),
            [
                ("bench_linkedlist".to_string(), false),
                ("bench_linkedlist".to_string(), true),
                ("bench_linkedlist_nvm".to_string(), false),
                ("bench_linkedlist_nvm_clwb".to_string(), false),
            ]
        );
        // baseline and jemalloc share a binary but not a cache entry
        assert_eq!(cmp.controller().store().len(), 4);
    }

    #[test]
    fn test_thread_chart_axis() {
        let config = Configuration::new(2, 5, 64, 64, VariantFlags::baseline_only()).unwrap();
        let mut cmp = comparator();
        let result = cmp
            .compare_family("alloc_free", &config, STANDARD_VARIANTS)
            .unwrap();
        let chart = result.thread_chart(&FAMILIES[0], &config);
        assert_eq!(chart.title, "Allocate and Free");
        assert_eq!(chart.x, [2.0, 3.0, 4.0, 5.0]);
        assert_eq!(chart.lines.len(), 1);
        assert_eq!(chart.lines[0].values.len(), chart.x.len());
    }

    #[test]
    fn test_recovery() {
        let config = Configuration::new(1, 10, 64, 64, VariantFlags::baseline_only()).unwrap();
        let mut cmp = comparator();
        let result = cmp.compare_recovery(&config, 4).unwrap();
        assert_eq!(result.family, "recovery");
        assert_eq!(result.entries[0].series.len(), 4);
        assert_eq!(
            distinct_binaries(&cmp),
            [("bench_recovery".to_string(), false)]
        );
        let chart = recovery_chart(&result, 4);
        assert_eq!(chart.x, [1.0, 2.0, 3.0, 4.0]);
        assert!(!chart.legend);
    }
}
