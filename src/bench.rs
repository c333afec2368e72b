use std::io::Write;
use std::time::{Duration, Instant};

use color_eyre::eyre::{Result, WrapErr};
use tracing::{debug, info};

use crate::{
    measure_aggregate, measure_per_op, BenchConfig, Key, ReadReport, RunReport, SampleKind,
    StageReport, Storage, StorageConfig, Store, Throughput, ValueGenerator,
};

/// Drives load-then-read cycles, one per configured value size.
#[derive(Debug, Clone)]
pub struct Bench {
    config: BenchConfig,
}

struct Loaded {
    inserted: u64,
    stages: Vec<StageReport>,
    strided: Vec<Key>,
    sequential: Vec<Key>,
}

impl Bench {
    pub fn new(config: BenchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub const fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// Runs every value size against a fresh store, writing each report to
    /// `out` as soon as its run finishes.
    pub fn run(&self, out: &mut impl Write) -> Result<Vec<RunReport>> {
        let mut reports = vec![];
        for value_size in self.config.values.sizes() {
            let storage = self.storage_for(value_size);
            let report = {
                let store = Storage::open(&storage)?;
                self.run_once(&store, value_size)?
            };
            writeln!(out, "{report}")?;
            out.flush()?;
            reports.push(report);
        }
        Ok(reports)
    }

    fn storage_for(&self, value_size: Option<usize>) -> StorageConfig {
        let mut storage = self.config.storage.clone();
        if let (true, Some(size)) = (self.config.values.is_sweep(), value_size) {
            storage.db_path = storage
                .db_path
                .join(format!("key_{}_value_{}", self.config.key_length, size));
        }
        storage
    }

    /// One load, optional flush, then the read rounds, against `store`.
    pub fn run_once<S: Store + ?Sized>(
        &self,
        store: &S,
        value_size: Option<usize>,
    ) -> Result<RunReport> {
        let total = self.config.total_count_for(value_size);
        info!(
            "run: key size {}, value size {:?}, {} keys",
            self.config.key_length, value_size, total
        );

        let loaded = self.load(store, total, value_size)?;
        if self.config.flush_after_load {
            store.flush().wrap_err("flush after load")?;
            debug!("flushed");
        }

        let mut reads = vec![];
        if self.config.sample_stride.is_some() {
            reads.push(self.read_rounds(store, SampleKind::Strided, &loaded.strided));
        }
        if self.config.sequential_sample_size > 0 {
            reads.push(self.read_rounds(store, SampleKind::Sequential, &loaded.sequential));
        }

        Ok(RunReport {
            key_length: self.config.key_length,
            value_size,
            total_inserted: loaded.inserted,
            stages: loaded.stages,
            reads,
        })
    }

    fn load<S: Store + ?Sized>(
        &self,
        store: &S,
        total: u64,
        value_size: Option<usize>,
    ) -> Result<Loaded> {
        let config = &self.config;
        let stage_size = total / config.stage_count;
        let inserted_total = stage_size * config.stage_count;
        let progress_every = (inserted_total / 10).max(1);

        let mut values = ValueGenerator::new(value_size, config.value_fill, config.seed);
        let mut key = Key::first(config.key_length);
        let mut loaded = Loaded {
            inserted: 0,
            stages: vec![],
            strided: vec![],
            sequential: vec![],
        };

        for stage in 0..config.stage_count {
            let mut elapsed = Duration::ZERO;
            for _ in 0..stage_size {
                let index = loaded.inserted;
                let value = values.value(index);

                let begin = Instant::now();
                store
                    .put(key.as_bytes(), &value)
                    .wrap_err_with(|| format!("put #{index} ({key})"))?;
                elapsed += begin.elapsed();

                if config.sample_stride.is_some_and(|n| index % n == 0) {
                    loaded.strided.push(key.clone());
                }
                if index < config.sequential_sample_size {
                    loaded.sequential.push(key.clone());
                }
                if index % progress_every == 0 {
                    info!("< {}/{} > ...", index, inserted_total);
                }

                key.increment();
                loaded.inserted += 1;
            }

            let checkpoint = if config.stage_count > 1 {
                self.checkpoint(store, loaded.inserted)
            } else {
                vec![]
            };
            loaded.stages.push(StageReport {
                stage: stage as usize,
                write: Throughput {
                    count: stage_size as usize,
                    elapsed,
                },
                total_inserted: loaded.inserted,
                checkpoint,
            });
        }
        Ok(loaded)
    }

    /// Keys spread evenly over the first `inserted` keys, at most
    /// `stage_query_limit` of them.
    pub fn checkpoint_keys(&self, inserted: u64) -> Vec<Key> {
        let query_count = self.config.stage_query_limit.min(inserted);
        if query_count == 0 {
            return vec![];
        }
        let stride = inserted / query_count;
        (0..query_count)
            .map(|m| Key::at(self.config.key_length, m * stride))
            .collect()
    }

    fn checkpoint<S: Store + ?Sized>(&self, store: &S, inserted: u64) -> Vec<Throughput> {
        let keys = self.checkpoint_keys(inserted);
        debug!("checkpoint at {} keys, reading {}", inserted, keys.len());
        (0..self.config.round_count)
            .map(|_| measure_aggregate(store, &keys))
            .collect()
    }

    fn read_rounds<S: Store + ?Sized>(&self, store: &S, kind: SampleKind, keys: &[Key]) -> ReadReport {
        info!("read {} sample of {} keys", kind, keys.len());
        let rounds = (0..self.config.round_count)
            .map(|_| measure_aggregate(store, keys))
            .collect();
        let latencies = (0..self.config.round_count)
            .map(|_| measure_per_op(store, keys))
            .collect();
        ReadReport {
            kind,
            sample_size: keys.len(),
            rounds,
            latencies,
        }
    }
}

#[test]
fn checkpoint_keys_spread_over_prefix() {
    let bench = Bench::new(BenchConfig {
        key_length: 4,
        stage_count: 4,
        stage_query_limit: 10,
        ..Default::default()
    })
    .unwrap();

    let keys = bench.checkpoint_keys(100);
    assert_eq!(10, keys.len());
    assert_eq!(Key::first(4), keys[0]);
    assert_eq!(Key::at(4, 90), keys[9]);

    // fewer keys than the limit: read each one
    let keys = bench.checkpoint_keys(3);
    assert_eq!(vec![Key::at(4, 0), Key::at(4, 1), Key::at(4, 2)], keys);

    assert!(bench.checkpoint_keys(0).is_empty());
}

#[test]
fn sweep_runs_use_separate_dirs() {
    let bench = Bench::new(BenchConfig {
        key_length: 16,
        values: crate::ValueSizes::Sweep { min: 32, max: 64 },
        ..Default::default()
    })
    .unwrap();
    let path = bench.storage_for(Some(64)).db_path;
    assert!(path.ends_with("key_16_value_64"));

    let single = Bench::new(BenchConfig::default()).unwrap();
    assert_eq!(
        single.config().storage.db_path,
        single.storage_for(None).db_path
    );
}
