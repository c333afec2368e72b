use std::cell::{Cell, RefCell};
use std::path::Path;

use bytes::Bytes;
use color_eyre::eyre::{eyre, Result};
use kv_bench::{
    Bench, BenchConfig, Key, KeySequence, SampleKind, Storage, StorageConfig, Store, ValueFill,
    ValueSizes,
};

fn config(db_path: &Path, total_count: u64, stride: u64) -> BenchConfig {
    BenchConfig {
        storage: StorageConfig {
            db_path: db_path.to_path_buf(),
            ..Default::default()
        },
        key_length: 8,
        total_count,
        sample_stride: Some(stride),
        round_count: 1,
        ..Default::default()
    }
}

fn open(path: &Path) -> Storage {
    Storage::open(&StorageConfig {
        db_path: path.to_path_buf(),
        ..Default::default()
    })
    .unwrap()
}

/// Records the keys read through it.
struct Recording<S> {
    inner: S,
    reads: RefCell<Vec<Vec<u8>>>,
}

impl<S: Store> Store for Recording<S> {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.put(key, value)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.reads.borrow_mut().push(key.to_vec());
        self.inner.get(key)
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }
}

/// Accepts `limit` puts, then fails; every read errors.
struct Failing {
    limit: usize,
    puts: Cell<usize>,
}

impl Store for Failing {
    fn put(&self, _key: &[u8], _value: &[u8]) -> Result<()> {
        if self.puts.get() == self.limit {
            return Err(eyre!("disk full"));
        }
        self.puts.set(self.puts.get() + 1);
        Ok(())
    }

    fn get(&self, _key: &[u8]) -> Result<Option<Bytes>> {
        Err(eyre!("read failed"))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[test]
fn stride_1000_over_1000_keys_samples_only_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new(config(dir.path(), 1000, 1000)).unwrap();
    let store = Recording {
        inner: open(dir.path()),
        reads: RefCell::new(vec![]),
    };

    let report = bench.run_once(&store, None).unwrap();
    assert_eq!(1000, report.total_inserted);
    assert_eq!(1, report.reads.len());
    assert_eq!(SampleKind::Strided, report.reads[0].kind);
    assert_eq!(1, report.reads[0].sample_size);

    // one aggregate round and one per-op round, both on key #0
    let reads = store.reads.borrow();
    assert_eq!(vec![b"AAAAAAAA".to_vec(); 2], *reads);

    assert_eq!(
        Some(Bytes::from_static(b"999")),
        store.inner.get(Key::at(8, 999).as_bytes()).unwrap()
    );
}

#[test]
fn stride_1_samples_every_key_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new(config(dir.path(), 1000, 1)).unwrap();
    let store = Recording {
        inner: open(dir.path()),
        reads: RefCell::new(vec![]),
    };

    let report = bench.run_once(&store, None).unwrap();
    assert_eq!(1000, report.reads[0].sample_size);

    let expected: Vec<Vec<u8>> = KeySequence::new(Key::first(8), 1000)
        .map(|k| k.as_bytes().to_vec())
        .collect();
    let reads = store.reads.borrow();
    assert_eq!(expected[..], reads[..1000]);
    assert_eq!(expected[..], reads[1000..]);
}

#[test]
fn sample_size_is_ceil_of_count_over_stride() {
    let dir = tempfile::tempdir().unwrap();
    for (total, stride, expected) in [(1000, 7, 143), (1000, 10, 100), (999, 10, 100), (5, 10, 1)] {
        let bench = Bench::new(config(dir.path(), total, stride)).unwrap();
        let report = bench.run_once(&open(dir.path()), None).unwrap();
        assert_eq!(expected, report.reads[0].sample_size, "{total}/{stride}");
    }
}

#[test]
fn empty_sample_reports_no_rate() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new(BenchConfig {
        sequential_sample_size: 10,
        ..config(dir.path(), 0, 1000)
    })
    .unwrap();

    let report = bench.run_once(&open(dir.path()), None).unwrap();
    assert_eq!(0, report.total_inserted);
    assert_eq!(2, report.reads.len());
    for read in &report.reads {
        assert_eq!(0, read.sample_size);
        assert_eq!(None, read.rounds[0].qps());
        assert_eq!(None, read.rounds[0].mean_latency());
        assert_eq!(vec![None], read.latencies);
    }
    assert!(report.to_string().contains("n/a"));
}

#[test]
fn single_key_latency_is_flat() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new(BenchConfig {
        round_count: 3,
        ..config(dir.path(), 1, 1)
    })
    .unwrap();

    let report = bench.run_once(&open(dir.path()), None).unwrap();
    let read = &report.reads[0];
    assert_eq!(3, read.latencies.len());
    for summary in &read.latencies {
        let s = summary.unwrap();
        assert_eq!(1, s.samples);
        assert_eq!(s.min, s.max);
        assert_eq!(s.min, s.mean);
    }
}

#[test]
fn sequential_sample_takes_the_first_keys() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new(BenchConfig {
        key_length: 128,
        values: ValueSizes::Fixed { size: 256 },
        value_fill: ValueFill::Uniform,
        sequential_sample_size: 50,
        ..config(dir.path(), 500, 100)
    })
    .unwrap();
    let store = open(dir.path());

    let report = bench.run_once(&store, Some(256)).unwrap();
    assert_eq!(SampleKind::Strided, report.reads[0].kind);
    assert_eq!(5, report.reads[0].sample_size);
    assert_eq!(SampleKind::Sequential, report.reads[1].kind);
    assert_eq!(50, report.reads[1].sample_size);

    let value = store.get(Key::at(128, 42).as_bytes()).unwrap().unwrap();
    assert_eq!(256, value.len());
    assert!(value.iter().all(|b| *b == value[0]));
}

#[test]
fn staged_load_reports_each_stage() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new(BenchConfig {
        stage_count: 4,
        stage_query_limit: 100,
        round_count: 2,
        sample_stride: None,
        ..config(dir.path(), 1003, 1)
    })
    .unwrap();

    let report = bench.run_once(&open(dir.path()), None).unwrap();
    assert_eq!(1000, report.total_inserted);
    assert!(report.reads.is_empty());
    assert_eq!(4, report.stages.len());
    for (i, stage) in report.stages.iter().enumerate() {
        assert_eq!(i, stage.stage);
        assert_eq!(250, stage.write.count);
        assert_eq!(250 * (i as u64 + 1), stage.total_inserted);
        assert_eq!(2, stage.checkpoint.len());
        assert!(stage.checkpoint.iter().all(|t| t.count == 100));
    }
}

#[test]
fn write_failure_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new(config(dir.path(), 100, 10)).unwrap();
    let store = Failing {
        limit: 42,
        puts: Cell::new(0),
    };

    let err = bench.run_once(&store, None).unwrap_err();
    assert_eq!("disk full", err.root_cause().to_string());
    assert_eq!(42, store.puts.get());
}

#[test]
fn read_errors_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new(config(dir.path(), 100, 10)).unwrap();
    let store = Failing {
        limit: usize::MAX,
        puts: Cell::new(0),
    };

    let report = bench.run_once(&store, None).unwrap();
    assert_eq!(10, report.reads[0].rounds[0].count);
    assert!(report.reads[0].latencies[0].is_some());
}

#[test]
fn sweep_runs_each_size_on_a_fresh_store() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new(BenchConfig {
        values: ValueSizes::Sweep { min: 32, max: 128 },
        ..config(dir.path(), 20, 5)
    })
    .unwrap();

    let mut out = vec![];
    let reports = bench.run(&mut out).unwrap();
    assert_eq!(
        vec![Some(32), Some(64), Some(128)],
        reports.iter().map(|r| r.value_size).collect::<Vec<_>>()
    );
    let text = String::from_utf8(out).unwrap();
    for size in [32, 64, 128] {
        assert!(text.contains(&format!("value size {size} ]]")));
        assert!(dir.path().join(format!("key_8_value_{size}")).is_dir());
    }
}

#[test]
fn byte_budget_sets_the_count() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new(BenchConfig {
        values: ValueSizes::Fixed { size: 24 },
        load_bytes: Some(32 * 64),
        ..config(dir.path(), 1, 1)
    })
    .unwrap();

    let mut out = vec![];
    let reports = bench.run(&mut out).unwrap();
    assert_eq!(64, reports[0].total_inserted);
}

/// Counts reads that found a value and reads that missed.
struct Hits<S> {
    inner: S,
    found: Cell<usize>,
    missed: Cell<usize>,
}

impl<S: Store> Store for Hits<S> {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.put(key, value)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let value = self.inner.get(key)?;
        let counter = if value.is_some() { &self.found } else { &self.missed };
        counter.set(counter.get() + 1);
        Ok(value)
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }
}

#[test]
fn stage_checkpoints_read_inserted_keys() {
    let dir = tempfile::tempdir().unwrap();
    let bench = Bench::new(BenchConfig {
        stage_count: 4,
        stage_query_limit: 300,
        round_count: 2,
        sample_stride: None,
        ..config(dir.path(), 1000, 1)
    })
    .unwrap();
    let store = Hits {
        inner: open(dir.path()),
        found: Cell::new(0),
        missed: Cell::new(0),
    };

    let report = bench.run_once(&store, None).unwrap();
    let expected: usize = report
        .stages
        .iter()
        .flat_map(|s| s.checkpoint.iter().map(|t| t.count))
        .sum();
    // 250 keys at the first boundary, then the 300 key cap
    assert_eq!(2 * (250 + 300 * 3), expected);
    assert_eq!(expected, store.found.get());
    assert_eq!(0, store.missed.get());

    // the last checkpoint key of the first stage is the last key of that stage
    let keys = bench.checkpoint_keys(250);
    assert_eq!(Key::at(8, 249), *keys.last().unwrap());
    assert_eq!(None, store.inner.get(Key::at(8, 1000).as_bytes()).unwrap());
}
