//! Allocator variants and benchmark families.
//!
//! A comparison chart is an ordered list of [`VariantSpec`]s. Each spec names
//! the binary suffix that selects the allocator build, the label and line
//! style used on the chart, and whether the alternate allocator is injected
//! by library preloading. Adding a variant means adding one row to
//! [`STANDARD_VARIANTS`] and one flag to [`VariantFlags`].

/// Optional variants, each switched on by one configuration flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariantFlag {
    /// Default build with jemalloc preloaded.
    Jemalloc,
    /// nvm_malloc with its default durability instructions.
    Nvm,
    Clflushopt,
    Clwb,
    NoFence,
    NoFlush,
    /// Neither fences nor flushes.
    NoFenceNoFlush,
}

/// When a variant takes part in a comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Selector {
    Always,
    Flag(VariantFlag),
}

/// Which optional variants are enabled for this run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VariantFlags {
    pub jemalloc: bool,
    pub nvm: bool,
    pub clflushopt: bool,
    pub clwb: bool,
    pub nofence: bool,
    pub noflush: bool,
    pub none: bool,
}

impl VariantFlags {
    /// Only the always-on baseline.
    pub const fn baseline_only() -> Self {
        Self {
            jemalloc: false,
            nvm: false,
            clflushopt: false,
            clwb: false,
            nofence: false,
            noflush: false,
            none: false,
        }
    }

    pub const fn is_set(&self, flag: VariantFlag) -> bool {
        match flag {
            VariantFlag::Jemalloc => self.jemalloc,
            VariantFlag::Nvm => self.nvm,
            VariantFlag::Clflushopt => self.clflushopt,
            VariantFlag::Clwb => self.clwb,
            VariantFlag::NoFence => self.nofence,
            VariantFlag::NoFlush => self.noflush,
            VariantFlag::NoFenceNoFlush => self.none,
        }
    }

    pub const fn selects(&self, selector: Selector) -> bool {
        match selector {
            Selector::Always => true,
            Selector::Flag(flag) => self.is_set(flag),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dash {
    Solid,
    Dashed,
    Dotted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Marker {
    Circle,
    Square,
    TriangleDown,
    TriangleUp,
    Plus,
    Cross,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LineStyle {
    pub dash: Dash,
    pub marker: Option<Marker>,
}

impl LineStyle {
    pub const fn plain(dash: Dash) -> Self {
        Self { dash, marker: None }
    }

    pub const fn marked(marker: Marker) -> Self {
        Self {
            dash: Dash::Solid,
            marker: Some(marker),
        }
    }
}

/// One allocator configuration plotted within a comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VariantSpec {
    pub selector: Selector,
    /// Appended to `bench_<family>` to name the binary.
    pub binary_suffix: &'static str,
    pub label: &'static str,
    pub style: LineStyle,
    /// Force-load the alternate allocator library ahead of the binary.
    pub preload: bool,
}

impl VariantSpec {
    pub fn binary_name(&self, family: &str) -> String {
        format!("bench_{family}{}", self.binary_suffix)
    }
}

/// The default system allocator, always compared.
pub const BASELINE: VariantSpec = VariantSpec {
    selector: Selector::Always,
    binary_suffix: "",
    label: "default malloc",
    style: LineStyle::plain(Dash::Dashed),
    preload: false,
};

pub const STANDARD_VARIANTS: &[VariantSpec] = &[
    BASELINE,
    VariantSpec {
        selector: Selector::Flag(VariantFlag::Jemalloc),
        binary_suffix: "",
        label: "jemalloc",
        style: LineStyle::plain(Dash::Dotted),
        preload: true,
    },
    VariantSpec {
        selector: Selector::Flag(VariantFlag::Nvm),
        binary_suffix: "_nvm",
        label: "nvm_malloc",
        style: LineStyle::marked(Marker::Circle),
        preload: false,
    },
    VariantSpec {
        selector: Selector::Flag(VariantFlag::Clflushopt),
        binary_suffix: "_nvm_clflushopt",
        label: "nvm_malloc with CLFLUSHOPT",
        style: LineStyle::marked(Marker::Square),
        preload: false,
    },
    VariantSpec {
        selector: Selector::Flag(VariantFlag::Clwb),
        binary_suffix: "_nvm_clwb",
        label: "nvm_malloc with CLWB",
        style: LineStyle::marked(Marker::TriangleDown),
        preload: false,
    },
    VariantSpec {
        selector: Selector::Flag(VariantFlag::NoFence),
        binary_suffix: "_nvm_nofence",
        label: "nvm_malloc no fences",
        style: LineStyle::marked(Marker::TriangleUp),
        preload: false,
    },
    VariantSpec {
        selector: Selector::Flag(VariantFlag::NoFlush),
        binary_suffix: "_nvm_noflush",
        label: "nvm_malloc no flushes",
        style: LineStyle::marked(Marker::Plus),
        preload: false,
    },
    VariantSpec {
        selector: Selector::Flag(VariantFlag::NoFenceNoFlush),
        binary_suffix: "_nvm_none",
        label: "nvm_malloc no fences/flushes",
        style: LineStyle::marked(Marker::Cross),
        preload: false,
    },
];

/// A benchmark program built once per variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BenchmarkFamily {
    pub name: &'static str,
    pub title: &'static str,
}

pub const FAMILIES: &[BenchmarkFamily] = &[
    BenchmarkFamily {
        name: "alloc_free",
        title: "Allocate and Free",
    },
    BenchmarkFamily {
        name: "alloc_free_alloc",
        title: "Allocate, Free and Allocate",
    },
    BenchmarkFamily {
        name: "fastalloc",
        title: "Allocation Loop",
    },
    BenchmarkFamily {
        name: "linkedlist",
        title: "Linked List Creation",
    },
];

pub const RECOVERY_BINARY: &str = "bench_recovery";
pub const RECOVERY_NAME: &str = "recovery";
