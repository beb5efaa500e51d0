//! Result cache keyed by sweep fingerprint.
//!
//! A sweep is expensive (every point is several process launches), so each
//! finished series is stored under a [`Fingerprint`] built from everything
//! that produced it. The store is a trait so the sweep engine can run against
//! a directory on disk or a plain map in tests.
//!
//! On disk every fingerprint owns one small TOML file:
//!
//! ```toml
//! fingerprint = "bench_fastalloc_1_10_64_64_false"
//! values = [12.5, 13.25, 14.0]
//! ```
//!
//! A file that does not parse, or that names a different fingerprint, is
//! reported as [`Error::CorruptCache`]. There is no repair; delete the cache
//! directory and rerun.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered timing values, one per sweep point, ascending parameter order.
pub type ResultSeries = Vec<f64>;

/// Exact-match cache key. Plain concatenation, never hashed, so two sweeps
/// share a key only when every field agrees.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// `lo` and `hi` are the sweep bounds: thread counts for a thread sweep,
    /// iteration counts for the recovery sweep.
    pub fn new(
        binary: &str,
        lo: u32,
        hi: u32,
        payload_min: u64,
        payload_max: u64,
        preload: bool,
    ) -> Self {
        Self(format!(
            "{binary}_{lo}_{hi}_{payload_min}_{payload_max}_{preload}"
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backing storage for finished series.
pub trait ResultStore {
    /// `Ok(None)` when nothing is stored for `fingerprint`.
    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<ResultSeries>>;

    /// Replace whatever is stored for `fingerprint`.
    fn store(&mut self, fingerprint: &Fingerprint, series: &[f64]) -> Result<()>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<Fingerprint, ResultSeries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResultStore for MemoryStore {
    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<ResultSeries>> {
        Ok(self.entries.get(fingerprint).cloned())
    }

    fn store(&mut self, fingerprint: &Fingerprint, series: &[f64]) -> Result<()> {
        self.entries.insert(fingerprint.clone(), series.to_vec());
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CacheRecord {
    fingerprint: String,
    values: Vec<f64>,
}

/// One file per fingerprint inside a cache directory. The directory must
/// already exist.
#[derive(Clone, Debug)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(fingerprint.as_str())
    }
}

impl ResultStore for DirStore {
    fn load(&self, fingerprint: &Fingerprint) -> Result<Option<ResultSeries>> {
        let path = self.path_for(fingerprint);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(Error::CorruptCache {
                    path,
                    reason: e.to_string(),
                });
            }
            Err(source) => return Err(Error::CacheIo { path, source }),
        };

        let record: CacheRecord = toml::from_str(&text).map_err(|e| Error::CorruptCache {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        if record.fingerprint != fingerprint.as_str() {
            return Err(Error::CorruptCache {
                path,
                reason: format!("entry belongs to {:?}", record.fingerprint),
            });
        }
        Ok(Some(record.values))
    }

    fn store(&mut self, fingerprint: &Fingerprint, series: &[f64]) -> Result<()> {
        let path = self.path_for(fingerprint);
        let record = CacheRecord {
            fingerprint: fingerprint.as_str().to_string(),
            values: series.to_vec(),
        };
        let text = toml::to_string(&record).map_err(|e| Error::CacheIo {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        // Stage then rename; readers never see a half-written entry.
        let staging = self.dir.join(format!("{fingerprint}.tmp"));
        fs::write(&staging, text).map_err(|source| Error::CacheIo {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &path).map_err(|source| Error::CacheIo { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> Fingerprint {
        Fingerprint::new("bench_fastalloc", 1, 10, 64, 64, false)
    }

    #[test]
    fn test_fingerprint_format() {
        assert_eq!(fp().as_str(), "bench_fastalloc_1_10_64_64_false");
        assert_eq!(
            Fingerprint::new("bench_linkedlist", 2, 8, 64, 256, true).to_string(),
            "bench_linkedlist_2_8_64_256_true"
        );
    }

    #[test]
    fn test_fingerprint_distinguishes_every_field() {
        let base = fp();
        let others = [
            Fingerprint::new("bench_fastalloc_nvm", 1, 10, 64, 64, false),
            Fingerprint::new("bench_fastalloc", 2, 10, 64, 64, false),
            Fingerprint::new("bench_fastalloc", 1, 11, 64, 64, false),
            Fingerprint::new("bench_fastalloc", 1, 10, 128, 128, false),
            Fingerprint::new("bench_fastalloc", 1, 10, 64, 65, false),
            Fingerprint::new("bench_fastalloc", 1, 10, 64, 64, true),
        ];
        for other in &others {
            assert_ne!(&base, other);
        }
    }

    #[test]
    fn test_memory_round_trip() {
        let mut store = MemoryStore::new();
        assert_eq!(store.load(&fp()).unwrap(), None);
        store.store(&fp(), &[1.5, 2.25, 3.0]).unwrap();
        assert_eq!(store.load(&fp()).unwrap(), Some(vec![1.5, 2.25, 3.0]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_dir_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirStore::new(dir.path());
        let series = vec![0.1, 1.0 / 3.0, 123456.789, 1e-9, 0.0];
        store.store(&fp(), &series).unwrap();
        assert!(store.path_for(&fp()).is_file());
        assert_eq!(store.load(&fp()).unwrap(), Some(series));
    }

    #[test]
    fn test_dir_empty_series() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirStore::new(dir.path());
        store.store(&fp(), &[]).unwrap();
        assert_eq!(store.load(&fp()).unwrap(), Some(vec![]));
    }

    #[test]
    fn test_dir_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path());
        assert_eq!(store.load(&fp()).unwrap(), None);
    }

    #[test]
    fn test_dir_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirStore::new(dir.path());
        store.store(&fp(), &[1.0, 2.0]).unwrap();
        store.store(&fp(), &[3.0]).unwrap();
        assert_eq!(store.load(&fp()).unwrap(), Some(vec![3.0]));
    }

    #[test]
    fn test_dir_store_leaves_only_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirStore::new(dir.path());
        store.store(&fp(), &[1.0, 2.0]).unwrap();
        store.store(&fp(), &[3.0]).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, [fp().as_str()]);
    }

    #[test]
    fn test_dir_interrupted_write_keeps_previous_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirStore::new(dir.path());
        store.store(&fp(), &[1.0, 2.0]).unwrap();
        // a crash between write and rename leaves only the staging file behind
        let staging = dir.path().join(format!("{}.tmp", fp()));
        fs::write(staging, "fingerprint = \"bench_fa").unwrap();
        assert_eq!(store.load(&fp()).unwrap(), Some(vec![1.0, 2.0]));

        let other = Fingerprint::new("bench_linkedlist", 1, 10, 64, 64, false);
        fs::write(dir.path().join(format!("{other}.tmp")), "values = [1.0,").unwrap();
        assert_eq!(store.load(&other).unwrap(), None);

        store.store(&fp(), &[4.0]).unwrap();
        assert_eq!(store.load(&fp()).unwrap(), Some(vec![4.0]));
    }

    #[test]
    fn test_dir_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path());
        fs::write(store.path_for(&fp()), "[1.0, 2.0").unwrap();
        let err = store.load(&fp()).unwrap_err();
        assert!(matches!(err, Error::CorruptCache { .. }), "{err}");
    }

    #[test]
    fn test_dir_rejects_non_numeric_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path());
        fs::write(
            store.path_for(&fp()),
            "fingerprint = \"bench_fastalloc_1_10_64_64_false\"\nvalues = [1.0, \"x\"]\n",
        )
        .unwrap();
        assert!(matches!(
            store.load(&fp()).unwrap_err(),
            Error::CorruptCache { .. }
        ));
    }

    #[test]
    fn test_dir_rejects_foreign_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirStore::new(dir.path());
        let other = Fingerprint::new("bench_linkedlist", 1, 10, 64, 64, false);
        store.store(&other, &[1.0]).unwrap();
        fs::rename(store.path_for(&other), store.path_for(&fp())).unwrap();
        assert!(matches!(
            store.load(&fp()).unwrap_err(),
            Error::CorruptCache { .. }
        ));
    }

    #[test]
    fn test_dir_store_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DirStore::new(dir.path().join("absent"));
        assert!(matches!(
            store.store(&fp(), &[1.0]).unwrap_err(),
            Error::CacheIo { .. }
        ));
    }
}
