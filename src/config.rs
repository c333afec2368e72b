use std::fs;
use std::path::Path;

use color_eyre::eyre::{bail, Result, WrapErr};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{StorageConfig, ValueFill};

/// Which value sizes a benchmark writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ValueSizes {
    /// The decimal insert index.
    Index,
    Fixed { size: usize },
    /// Powers of two from `min` up to and including `max`, one run each.
    Sweep { min: usize, max: usize },
}

impl ValueSizes {
    /// One entry per run; `None` means index-valued.
    pub fn sizes(&self) -> Vec<Option<usize>> {
        match *self {
            Self::Index => vec![None],
            Self::Fixed { size } => vec![Some(size)],
            Self::Sweep { min, max } => {
                let mut sizes = vec![];
                let mut size = min;
                while size <= max {
                    sizes.push(Some(size));
                    match size.checked_mul(2) {
                        Some(next) => size = next,
                        None => break,
                    }
                }
                sizes
            }
        }
    }

    pub const fn is_sweep(&self) -> bool {
        matches!(self, Self::Sweep { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub storage: StorageConfig,
    pub key_length: usize,
    pub values: ValueSizes,
    pub value_fill: ValueFill,
    pub total_count: u64,
    /// When set, each run inserts `load_bytes / (key_length + value_size)` keys
    /// instead of `total_count`.
    pub load_bytes: Option<u64>,
    /// Keep every Nth inserted key for the read phase. `None` skips it.
    pub sample_stride: Option<u64>,
    /// Keep the first K inserted keys for the read phase.
    pub sequential_sample_size: u64,
    pub stage_count: u64,
    /// Upper bound on keys read at each stage checkpoint.
    pub stage_query_limit: u64,
    pub round_count: usize,
    pub flush_after_load: bool,
    pub seed: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Preset::PointRead.config()
    }
}

impl BenchConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::default().overlay_json_file(path)
    }

    /// Replaces the fields the JSON file names and keeps the rest of `self`.
    /// Nested objects are merged field by field.
    pub fn overlay_json_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read(path).wrap_err_with(|| format!("read config {}", path.display()))?;
        let overlay: Value =
            serde_json::from_slice(&raw).wrap_err_with(|| format!("parse config {}", path.display()))?;
        if !overlay.is_object() {
            bail!("config {} must be a JSON object", path.display());
        }

        let mut merged = serde_json::to_value(self)?;
        merge(&mut merged, overlay);
        serde_json::from_value(merged).wrap_err_with(|| format!("parse config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_length == 0 {
            bail!("key_length must be at least 1");
        }
        if self.stage_count == 0 {
            bail!("stage_count must be at least 1");
        }
        if self.round_count == 0 {
            bail!("round_count must be at least 1");
        }
        if self.sample_stride == Some(0) {
            bail!("sample_stride must be at least 1");
        }
        if self.stage_count > 1 && self.stage_query_limit == 0 {
            bail!("stage_query_limit must be at least 1 for staged loads");
        }
        if let ValueSizes::Sweep { min, max } = self.values {
            if min == 0 || min > max {
                bail!("value sweep needs 0 < min <= max, got {min}..={max}");
            }
        }
        if self.load_bytes == Some(0) {
            bail!("load_bytes must be positive");
        }
        Ok(())
    }

    /// Number of keys one run inserts for the given value size.
    pub fn total_count_for(&self, value_size: Option<usize>) -> u64 {
        match self.load_bytes {
            Some(budget) => {
                let entity = (self.key_length + value_size.unwrap_or(0)) as u64;
                budget / entity.max(1)
            }
            None => self.total_count,
        }
    }
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        // an object naming another `kind` replaces the whole variant
        (Value::Object(base), Value::Object(overlay))
            if overlay
                .get("kind")
                .map_or(true, |kind| base.get("kind") == Some(kind)) =>
        {
            for (k, v) in overlay {
                match base.get_mut(&k) {
                    Some(slot) => merge(slot, v),
                    None => {
                        base.insert(k, v);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Ready-made configurations for the classic runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Preset {
    /// 10M 8-byte keys with index values, every 1000th key read back.
    PointRead,
    /// 128-byte keys, values 128B..16MiB, 1GiB per size loaded in four stages.
    ValueSweep,
    /// 10M 128-byte keys with index values, strided and sequential reads.
    ShortValue,
    /// 10M 128-byte keys with 256-byte values, strided and sequential reads.
    LongValue,
}

impl Preset {
    pub fn config(self) -> BenchConfig {
        let point_read = BenchConfig {
            storage: StorageConfig::default(),
            key_length: 8,
            values: ValueSizes::Index,
            value_fill: ValueFill::default(),
            total_count: 10_000_000,
            load_bytes: None,
            sample_stride: Some(1000),
            sequential_sample_size: 0,
            stage_count: 1,
            stage_query_limit: 50_000,
            round_count: 5,
            flush_after_load: true,
            seed: 0,
        };
        match self {
            Self::PointRead => point_read,
            Self::ValueSweep => BenchConfig {
                key_length: 128,
                values: ValueSizes::Sweep {
                    min: 128,
                    max: 16 * 1024 * 1024,
                },
                load_bytes: Some(1024 * 1024 * 1024),
                sample_stride: None,
                stage_count: 4,
                flush_after_load: false,
                ..point_read
            },
            Self::ShortValue => BenchConfig {
                key_length: 128,
                sequential_sample_size: 10_000,
                ..point_read
            },
            Self::LongValue => BenchConfig {
                key_length: 128,
                values: ValueSizes::Fixed { size: 256 },
                sequential_sample_size: 10_000,
                ..point_read
            },
        }
    }
}

#[test]
fn sweep_doubles_up_to_max() {
    let sizes = ValueSizes::Sweep { min: 128, max: 1024 }.sizes();
    assert_eq!(
        vec![Some(128), Some(256), Some(512), Some(1024)],
        sizes
    );
    assert_eq!(
        vec![Some(3), Some(6)],
        ValueSizes::Sweep { min: 3, max: 11 }.sizes()
    );
    assert_eq!(vec![None], ValueSizes::Index.sizes());
    assert_eq!(vec![Some(7)], ValueSizes::Fixed { size: 7 }.sizes());
}

#[test]
fn value_sweep_preset_covers_128b_to_16mib() {
    let config = Preset::ValueSweep.config();
    let sizes = config.values.sizes();
    assert_eq!(18, sizes.len());
    assert_eq!(Some(16 * 1024 * 1024), *sizes.last().unwrap());
    // 1GiB / (128 + 128)
    assert_eq!(4_194_304, config.total_count_for(Some(128)));
    config.validate().unwrap();
}

#[test]
fn validation_rejects_degenerate_configs() {
    let ok = BenchConfig::default();
    ok.validate().unwrap();

    let cases = [
        BenchConfig { key_length: 0, ..ok.clone() },
        BenchConfig { stage_count: 0, ..ok.clone() },
        BenchConfig { round_count: 0, ..ok.clone() },
        BenchConfig { sample_stride: Some(0), ..ok.clone() },
        BenchConfig { load_bytes: Some(0), ..ok.clone() },
        BenchConfig {
            values: ValueSizes::Sweep { min: 0, max: 8 },
            ..ok.clone()
        },
        BenchConfig {
            values: ValueSizes::Sweep { min: 16, max: 8 },
            ..ok.clone()
        },
        BenchConfig {
            stage_count: 2,
            stage_query_limit: 0,
            ..ok.clone()
        },
    ];
    for case in cases {
        assert!(case.validate().is_err(), "{case:?}");
    }
}

#[test]
fn json_config_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.json");
    fs::write(
        &path,
        r#"{
            "key_length": 16,
            "values": { "kind": "fixed", "size": 64 },
            "value_fill": "uniform",
            "storage": { "db_path": "/tmp/elsewhere" }
        }"#,
    )
    .unwrap();

    let config = BenchConfig::from_json_file(&path).unwrap();
    assert_eq!(16, config.key_length);
    assert_eq!(ValueSizes::Fixed { size: 64 }, config.values);
    assert_eq!(ValueFill::Uniform, config.value_fill);
    assert_eq!(Path::new("/tmp/elsewhere"), config.storage.db_path);
    assert_eq!(5, config.round_count);
    assert_eq!(Some(1000), config.sample_stride);

    assert!(BenchConfig::from_json_file(dir.path().join("missing.json")).is_err());
}

#[test]
fn json_overlay_keeps_unnamed_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.json");
    fs::write(
        &path,
        r#"{ "key_length": 16, "values": { "kind": "sweep", "min": 256 }, "storage": { "sync_writes": true } }"#,
    )
    .unwrap();

    let config = Preset::ValueSweep.config().overlay_json_file(&path).unwrap();
    assert_eq!(16, config.key_length);
    assert_eq!(
        ValueSizes::Sweep {
            min: 256,
            max: 16 * 1024 * 1024
        },
        config.values
    );
    assert_eq!(4, config.stage_count);
    assert_eq!(Some(1024 * 1024 * 1024), config.load_bytes);
    assert_eq!(None, config.sample_stride);
    assert!(config.storage.sync_writes);
    assert_eq!(Path::new("/tmp/kv_bench"), config.storage.db_path);

    fs::write(&path, r#"{ "values": { "kind": "fixed", "size": 64 } }"#).unwrap();
    let config = Preset::ValueSweep.config().overlay_json_file(&path).unwrap();
    assert_eq!(ValueSizes::Fixed { size: 64 }, config.values);

    fs::write(&path, "[1, 2]").unwrap();
    assert!(BenchConfig::default().overlay_json_file(&path).is_err());
}
