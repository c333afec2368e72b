use std::hint::black_box;
use std::time::{Duration, Instant};

use crate::{Key, Store};

/// Count and wall-clock time of one timed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throughput {
    pub count: usize,
    pub elapsed: Duration,
}

impl Throughput {
    /// Operations per second; `None` for an empty or zero-length pass.
    pub fn qps(&self) -> Option<f64> {
        if self.count == 0 || self.elapsed.is_zero() {
            return None;
        }
        Some(self.count as f64 / self.elapsed.as_secs_f64())
    }

    /// Mean time per operation; `None` for an empty pass.
    pub fn mean_latency(&self) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }
        Some(nanos(self.elapsed.as_nanos() / self.count as u128))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub samples: usize,
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
}

impl LatencySummary {
    pub fn from_samples(samples: &[Duration]) -> Option<Self> {
        let min = *samples.iter().min()?;
        let max = *samples.iter().max()?;
        let total: u128 = samples.iter().map(Duration::as_nanos).sum();
        Some(Self {
            samples: samples.len(),
            min,
            max,
            mean: nanos(total / samples.len() as u128),
        })
    }
}

fn nanos(n: u128) -> Duration {
    Duration::from_nanos(u64::try_from(n).unwrap_or(u64::MAX))
}

/// Times one pass of reads over `keys`. Misses and read errors are ignored.
pub fn measure_aggregate<S: Store + ?Sized>(store: &S, keys: &[Key]) -> Throughput {
    let start = Instant::now();
    for key in keys {
        let _ = black_box(store.get(key.as_bytes()));
    }
    Throughput {
        count: keys.len(),
        elapsed: start.elapsed(),
    }
}

/// Times every read over `keys` individually.
pub fn measure_per_op<S: Store + ?Sized>(store: &S, keys: &[Key]) -> Option<LatencySummary> {
    let mut latencies = Vec::with_capacity(keys.len());
    for key in keys {
        let begin = Instant::now();
        let _ = black_box(store.get(key.as_bytes()));
        latencies.push(begin.elapsed());
    }
    LatencySummary::from_samples(&latencies)
}

#[test]
fn empty_pass_has_no_rate() {
    let t = Throughput {
        count: 0,
        elapsed: Duration::from_millis(3),
    };
    assert_eq!(None, t.qps());
    assert_eq!(None, t.mean_latency());

    let instant = Throughput {
        count: 10,
        elapsed: Duration::ZERO,
    };
    assert_eq!(None, instant.qps());
    assert_eq!(Some(Duration::ZERO), instant.mean_latency());
}

#[test]
fn rate_and_mean() {
    let t = Throughput {
        count: 1000,
        elapsed: Duration::from_millis(500),
    };
    assert_eq!(Some(2000.0), t.qps());
    assert_eq!(Some(Duration::from_micros(500)), t.mean_latency());
}

#[test]
fn summary_of_samples() {
    assert_eq!(None, LatencySummary::from_samples(&[]));

    let one = LatencySummary::from_samples(&[Duration::from_nanos(750)]).unwrap();
    assert_eq!(1, one.samples);
    assert_eq!(one.min, one.max);
    assert_eq!(one.min, one.mean);
    assert_eq!(Duration::from_nanos(750), one.mean);

    let many = LatencySummary::from_samples(&[
        Duration::from_nanos(300),
        Duration::from_nanos(100),
        Duration::from_nanos(200),
    ])
    .unwrap();
    assert_eq!(Duration::from_nanos(100), many.min);
    assert_eq!(Duration::from_nanos(300), many.max);
    assert_eq!(Duration::from_nanos(200), many.mean);
}
