//! Single invocation of an external benchmark binary.
//!
//! A benchmark binary takes `<parameter> <payload_min> <payload_max>` and
//! prints one number (the elapsed time) on stdout. [`CommandRunner`] starts
//! it from the build directory, pinned to one NUMA node, with a cleared
//! environment that only carries `PATH` and the library search path. The
//! alternate allocator is injected through the dynamic loader's preload
//! variable so the same binary can be measured against it.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use log::trace;

use crate::error::{Error, Result};

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        /// Loader variable that force-loads a library ahead of the binary's own.
        pub const PRELOAD_VAR: &str = "DYLD_INSERT_LIBRARIES";
        pub const LIBRARY_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
    } else {
        /// Loader variable that force-loads a library ahead of the binary's own.
        pub const PRELOAD_VAR: &str = "LD_PRELOAD";
        pub const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";
    }
}

/// The exact argument tuple for one process invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweepPoint {
    pub binary: String,
    /// Thread count, or iteration count for the recovery sweep.
    pub parameter: u32,
    pub payload_min: u64,
    pub payload_max: u64,
}

impl SweepPoint {
    pub fn args(&self) -> [String; 3] {
        [
            self.parameter.to_string(),
            self.payload_min.to_string(),
            self.payload_max.to_string(),
        ]
    }
}

/// Runs one benchmark process and returns the number it printed.
pub trait Runner {
    fn invoke(&mut self, point: &SweepPoint, preload: bool) -> Result<f64>;
}

/// NUMA pinning wrapper, e.g. `hwloc-bind node:1 <binary> ...`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pinning {
    pub command: String,
    pub node: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Directory containing the `bench_*` binaries.
    pub build_dir: PathBuf,
    /// Search path for the allocator shared libraries the binaries link.
    pub library_dir: PathBuf,
    /// Alternate allocator injected when a variant asks for preloading.
    pub preload_library: PathBuf,
    pub pinning: Option<Pinning>,
}

pub struct CommandRunner {
    options: RunnerOptions,
}

impl CommandRunner {
    pub fn new(options: RunnerOptions) -> Self {
        Self { options }
    }

    /// Build the command line for `point` without starting it.
    pub fn command(&self, point: &SweepPoint, preload: bool) -> Command {
        let binary = self.options.build_dir.join(&point.binary);
        let mut cmd = match &self.options.pinning {
            Some(pin) => {
                let mut cmd = Command::new(&pin.command);
                cmd.arg(format!("node:{}", pin.node)).arg(&binary);
                cmd
            }
            None => Command::new(&binary),
        };
        cmd.args(point.args());

        cmd.env_clear();
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        cmd.env(LIBRARY_PATH_VAR, &self.options.library_dir);
        if preload {
            cmd.env(PRELOAD_VAR, &self.options.preload_library);
        }
        cmd
    }
}

impl Runner for CommandRunner {
    fn invoke(&mut self, point: &SweepPoint, preload: bool) -> Result<f64> {
        let mut cmd = self.command(point, preload);
        trace!("spawning {cmd:?}");
        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| Error::Launch {
                binary: point.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::ExitStatus {
                binary: point.binary.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_output(&point.binary, &output.stdout)
    }
}

/// Parse a benchmark's stdout: exactly one finite number, surrounding
/// whitespace allowed.
pub fn parse_output(binary: &str, stdout: &[u8]) -> Result<f64> {
    let malformed = || Error::MalformedOutput {
        binary: binary.to_string(),
        output: String::from_utf8_lossy(stdout).into_owned(),
    };
    let text = std::str::from_utf8(stdout).map_err(|_| malformed())?;
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(malformed()),
    }
}
