use std::fmt;
use std::time::Duration;

use crate::{LatencySummary, Throughput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// Every Nth key of the whole load.
    Strided,
    /// The first K keys inserted.
    Sequential,
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strided => f.write_str("strided"),
            Self::Sequential => f.write_str("sequential"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: usize,
    pub write: Throughput,
    pub total_inserted: u64,
    /// Aggregate read rounds over keys inserted so far; empty for unstaged loads.
    pub checkpoint: Vec<Throughput>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadReport {
    pub kind: SampleKind,
    pub sample_size: usize,
    pub rounds: Vec<Throughput>,
    pub latencies: Vec<Option<LatencySummary>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub key_length: usize,
    pub value_size: Option<usize>,
    pub total_inserted: u64,
    pub stages: Vec<StageReport>,
    pub reads: Vec<ReadReport>,
}

fn qps(t: &Throughput) -> String {
    t.qps().map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

fn per_op(t: &Throughput) -> String {
    t.mean_latency()
        .map_or_else(|| "n/a".to_string(), |d| format!("{} ns", d.as_nanos()))
}

fn ms(d: Duration) -> String {
    format!("{:.3} ms", d.as_secs_f64() * 1000.0)
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value_size {
            Some(size) => writeln!(
                f,
                "[[ key size {} | value size {} ]]",
                self.key_length, size
            )?,
            None => writeln!(
                f,
                "[[ key size {} | index values ]]",
                self.key_length
            )?,
        }
        writeln!(f, "inserted: {}", self.total_inserted)?;

        if !self.stages.is_empty() {
            writeln!(f, "\n== write ==")?;
            writeln!(
                f,
                "{:>6} {:>12} {:>14} {:>16} {:>16} {:>14}",
                "stage", "count", "total", "time", "QPS", "latency"
            )?;
            for stage in &self.stages {
                writeln!(
                    f,
                    "{:>6} {:>12} {:>14} {:>16} {:>16} {:>14}",
                    stage.stage,
                    stage.write.count,
                    stage.total_inserted,
                    ms(stage.write.elapsed),
                    qps(&stage.write),
                    per_op(&stage.write)
                )?;
                for (round, read) in stage.checkpoint.iter().enumerate() {
                    writeln!(
                        f,
                        "{:>6} {:>12} {:>14} {:>16} {:>16} {:>14}",
                        format!("q{round}"),
                        read.count,
                        stage.total_inserted,
                        ms(read.elapsed),
                        qps(read),
                        per_op(read)
                    )?;
                }
            }
        }

        for read in &self.reads {
            writeln!(f, "\n== read: {} ({} keys) ==", read.kind, read.sample_size)?;
            writeln!(
                f,
                "{:>6} {:>12} {:>16} {:>16} {:>14}",
                "round", "count", "time", "QPS", "latency"
            )?;
            for (round, t) in read.rounds.iter().enumerate() {
                writeln!(
                    f,
                    "{:>6} {:>12} {:>16} {:>16} {:>14}",
                    round,
                    t.count,
                    ms(t.elapsed),
                    qps(t),
                    per_op(t)
                )?;
            }
            writeln!(f, "-- per-op latency --")?;
            for (round, summary) in read.latencies.iter().enumerate() {
                match summary {
                    Some(s) => writeln!(
                        f,
                        "{:>6}  min: {} ns\tmax: {} ns\tavg: {} ns",
                        round,
                        s.min.as_nanos(),
                        s.max.as_nanos(),
                        s.mean.as_nanos()
                    )?,
                    None => writeln!(f, "{round:>6}  n/a")?,
                }
            }
        }
        Ok(())
    }
}

#[test]
fn empty_round_prints_na() {
    let report = RunReport {
        key_length: 8,
        value_size: None,
        total_inserted: 0,
        stages: vec![],
        reads: vec![ReadReport {
            kind: SampleKind::Sequential,
            sample_size: 0,
            rounds: vec![Throughput {
                count: 0,
                elapsed: Duration::ZERO,
            }],
            latencies: vec![None],
        }],
    };
    let text = report.to_string();
    assert!(text.contains("index values"));
    assert!(text.contains("read: sequential (0 keys)"));
    assert!(text.contains("n/a"));
}

#[test]
fn stage_rows() {
    let report = RunReport {
        key_length: 128,
        value_size: Some(256),
        total_inserted: 2000,
        stages: vec![StageReport {
            stage: 0,
            write: Throughput {
                count: 2000,
                elapsed: Duration::from_millis(2),
            },
            total_inserted: 2000,
            checkpoint: vec![],
        }],
        reads: vec![],
    };
    let text = report.to_string();
    assert!(text.contains("value size 256"));
    assert!(text.contains("2.000 ms"));
    assert!(text.contains("1000000.00"));
    assert!(text.contains("1000 ns"));
}
