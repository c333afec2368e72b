use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use color_eyre::eyre::{Result, WrapErr};
use redb::{Database, Durability, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

mod bench;
mod config;
mod key;
mod measure;
mod report;
mod value;

pub use bench::Bench;
pub use config::{BenchConfig, Preset, ValueSizes};
pub use key::{Key, KeySequence};
pub use measure::{measure_aggregate, measure_per_op, LatencySummary, Throughput};
pub use report::{ReadReport, RunReport, SampleKind, StageReport};
pub use value::{ValueFill, ValueGenerator};

const TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("BENCH");
const DB_FILE_NAME: &str = "bench.redb";

/// The narrow store contract the harness is written against.
pub trait Store {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;
    fn flush(&self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    /// Commit every put with `Durability::Immediate`. Otherwise puts commit with
    /// `Durability::Eventual` and `flush` makes them durable.
    pub sync_writes: bool,
    pub cache_size: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("/tmp/kv_bench"),
            sync_writes: false,
            cache_size: None,
        }
    }
}

#[derive(Debug)]
pub struct Storage {
    db: Database,
    sync_writes: bool,
}

impl Storage {
    /// Removes whatever lives at `db_path`, recreates the directory and opens a
    /// new database inside it.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        reset_dir(&config.db_path)?;
        let file = config.db_path.join(DB_FILE_NAME);

        let mut builder = Database::builder();
        if let Some(v) = config.cache_size {
            builder.set_cache_size(v);
        }
        let db = builder
            .create(&file)
            .wrap_err_with(|| format!("open store at {}", file.display()))?;

        // create the table up front so reads against an empty store see a miss
        let write_txn = db.begin_write()?;
        write_txn.open_table(TABLE)?;
        write_txn.commit()?;

        info!("opened store at {}", file.display());
        Ok(Self {
            db,
            sync_writes: config.sync_writes,
        })
    }
}

fn reset_dir(path: &Path) -> Result<()> {
    if path.exists() {
        debug!("removing previous store at {}", path.display());
        fs::remove_dir_all(path).wrap_err_with(|| format!("remove {}", path.display()))?;
    }
    fs::create_dir_all(path).wrap_err_with(|| format!("create {}", path.display()))?;
    Ok(())
}

impl Store for Storage {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut write_txn = self.db.begin_write()?;
        if !self.sync_writes {
            // `None` commits leave freed pages unreclaimed until a durable commit
            write_txn.set_durability(Durability::Eventual);
        }
        {
            let mut table = write_txn.open_table(TABLE)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE)?;
        Ok(table.get(key)?.map(|v| Bytes::copy_from_slice(v.value())))
    }

    fn flush(&self) -> Result<()> {
        // an empty durable commit persists every eventual commit before it
        let mut write_txn = self.db.begin_write()?;
        write_txn.set_durability(Durability::Immediate);
        write_txn.commit()?;
        Ok(())
    }
}

#[test]
fn open_resets_previous_contents() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        db_path: dir.path().join("store"),
        ..Default::default()
    };

    let store = Storage::open(&config).unwrap();
    store.put(b"AAAA", b"0").unwrap();
    store.flush().unwrap();
    assert_eq!(Some(Bytes::from_static(b"0")), store.get(b"AAAA").unwrap());
    drop(store);

    let store = Storage::open(&config).unwrap();
    assert_eq!(None, store.get(b"AAAA").unwrap());
}

#[test]
fn put_get_flush() {
    let dir = tempfile::tempdir().unwrap();
    let store = Storage::open(&StorageConfig {
        db_path: dir.path().to_path_buf(),
        sync_writes: true,
        cache_size: Some(16 * 1024 * 1024),
    })
    .unwrap();

    let mut key = Key::first(8);
    for i in 0..100u32 {
        store.put(key.as_bytes(), i.to_string().as_bytes()).unwrap();
        key.increment();
    }
    store.flush().unwrap();

    assert_eq!(
        Some(Bytes::from_static(b"99")),
        store.get(Key::at(8, 99).as_bytes()).unwrap()
    );
    assert_eq!(None, store.get(Key::at(8, 100).as_bytes()).unwrap());
}

#[test]
fn open_fails_when_path_is_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plain");
    fs::write(&file, b"x").unwrap();
    let parent_is_file = StorageConfig {
        db_path: file.join("store"),
        ..Default::default()
    };
    assert!(Storage::open(&parent_is_file).is_err());
}

#[test]
fn deferred_puts_reuse_pages() {
    let dir = tempfile::tempdir().unwrap();
    let store = Storage::open(&StorageConfig {
        db_path: dir.path().to_path_buf(),
        ..Default::default()
    })
    .unwrap();

    let mut key = Key::first(8);
    let mut payload = 0;
    for i in 0..10_000u32 {
        let value = i.to_string();
        payload += key.len() + value.len();
        store.put(key.as_bytes(), value.as_bytes()).unwrap();
        key.increment();
    }
    store.flush().unwrap();

    let size = fs::metadata(dir.path().join(DB_FILE_NAME)).unwrap().len() as usize;
    assert!(size < payload * 64, "{size} bytes on disk for {payload} bytes written");
    assert_eq!(
        Some(Bytes::from_static(b"9999")),
        store.get(Key::at(8, 9999).as_bytes()).unwrap()
    );
}
