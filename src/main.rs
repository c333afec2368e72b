use std::io;
use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use kv_bench::{Bench, BenchConfig, Preset, ValueFill, ValueSizes};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Load an embedded kv store with generated keys and report write/read QPS
/// and latency.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Start from a ready-made configuration.
    #[arg(long, value_enum, default_value = "point-read")]
    preset: Preset,
    /// JSON file overriding the preset.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the store is created in; it is deleted first.
    #[arg(long)]
    db_path: Option<PathBuf>,
    #[arg(long)]
    key_length: Option<usize>,
    #[arg(long)]
    count: Option<u64>,
    /// Insert as many keys as fit in this many bytes of key + value.
    #[arg(long)]
    load_bytes: Option<u64>,
    /// Fixed value size in bytes.
    #[arg(long, conflicts_with_all = ["sweep_min", "index_values"])]
    value_size: Option<usize>,
    #[arg(long, requires = "sweep_max")]
    sweep_min: Option<usize>,
    #[arg(long, requires = "sweep_min")]
    sweep_max: Option<usize>,
    /// Write the decimal insert index as the value.
    #[arg(long, conflicts_with = "sweep_min")]
    index_values: bool,
    #[arg(long, value_enum)]
    fill: Option<ValueFill>,
    /// Keep every Nth key for the read phase.
    #[arg(long)]
    stride: Option<u64>,
    /// Keep the first K keys for a sequential read phase.
    #[arg(long)]
    seq_sample: Option<u64>,
    #[arg(long)]
    stages: Option<u64>,
    #[arg(long)]
    rounds: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    no_flush: bool,
    #[arg(long)]
    sync_writes: bool,
}

impl Cli {
    fn into_config(self) -> Result<BenchConfig> {
        let mut config = self.preset.config();
        if let Some(path) = &self.config {
            config = config.overlay_json_file(path)?;
        }

        if let Some(v) = self.db_path {
            config.storage.db_path = v;
        }
        if let Some(v) = self.key_length {
            config.key_length = v;
        }
        if let Some(v) = self.count {
            config.total_count = v;
            config.load_bytes = None;
        }
        if let Some(v) = self.load_bytes {
            config.load_bytes = Some(v);
        }
        if self.index_values {
            config.values = ValueSizes::Index;
        }
        if let Some(size) = self.value_size {
            config.values = ValueSizes::Fixed { size };
        }
        if let (Some(min), Some(max)) = (self.sweep_min, self.sweep_max) {
            config.values = ValueSizes::Sweep { min, max };
        }
        if let Some(v) = self.fill {
            config.value_fill = v;
        }
        if let Some(v) = self.stride {
            config.sample_stride = Some(v);
        }
        if let Some(v) = self.seq_sample {
            config.sequential_sample_size = v;
        }
        if let Some(v) = self.stages {
            config.stage_count = v;
        }
        if let Some(v) = self.rounds {
            config.round_count = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if self.no_flush {
            config.flush_after_load = false;
        }
        if self.sync_writes {
            config.storage.sync_writes = true;
        }
        Ok(config)
    }
}

fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kv_bench=info,warn"));
    let fmt_layer = fmt::layer().with_writer(io::stderr).with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_logging();

    let config = Cli::parse().into_config()?;
    info!("config: {:?}", config);
    let bench = Bench::new(config)?;

    let stdout = io::stdout();
    let reports = bench.run(&mut stdout.lock())?;
    info!("finished {} run(s)", reports.len());
    Ok(())
}

#[test]
fn config_file_overlays_preset_and_flags_win() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.json");
    std::fs::write(&path, r#"{ "key_length": 16, "round_count": 2 }"#).unwrap();
    let path = path.to_str().unwrap();

    let config = Cli::parse_from(["kv_bench", "--preset", "value-sweep", "--config", path])
        .into_config()
        .unwrap();
    assert_eq!(16, config.key_length);
    assert_eq!(2, config.round_count);
    assert_eq!(4, config.stage_count);
    assert_eq!(Some(1024 * 1024 * 1024), config.load_bytes);
    assert!(config.values.is_sweep());

    let config = Cli::parse_from([
        "kv_bench", "--preset", "value-sweep", "--config", path, "--rounds", "7", "--key-length",
        "32",
    ])
    .into_config()
    .unwrap();
    assert_eq!(7, config.round_count);
    assert_eq!(32, config.key_length);
}

#[test]
fn count_flag_clears_byte_budget() {
    let config = Cli::parse_from(["kv_bench", "--preset", "value-sweep", "--count", "100"])
        .into_config()
        .unwrap();
    assert_eq!(100, config.total_count);
    assert_eq!(None, config.load_bytes);

    let config = Cli::parse_from(["kv_bench", "--count", "100", "--load-bytes", "4096"])
        .into_config()
        .unwrap();
    assert_eq!(Some(4096), config.load_bytes);
    assert_eq!(4096 / 8, config.total_count_for(None));

    let config = Cli::parse_from(["kv_bench", "--index-values", "--no-flush", "--sync-writes"])
        .into_config()
        .unwrap();
    assert_eq!(ValueSizes::Index, config.values);
    assert!(!config.flush_after_load);
    assert!(config.storage.sync_writes);
}
