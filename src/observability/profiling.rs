//! Timing and row-count profiling.
//!
//! A [`Profiler`] is created per run (a purge, a step execution) rather than
//! as a process-wide singleton. Operations are timed with RAII spans and the
//! collected data is rendered as a report.
//!
//! ```ignore
//! let profiler = Profiler::new();
//! {
//!     let mut span = profiler.span("purge.closed_issues");
//!     let deleted = store.delete_closed_before(project, before)?;
//!     span.rows(deleted);
//! }
//! log::info!("{}", profiler.report().to_summary());
//! ```

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Thread-safe timing data collector.
#[derive(Debug)]
pub struct Profiler {
    timings: DashMap<String, TimingEntry>,
    start_time: Instant,
}

/// Entry for a single operation.
#[derive(Debug)]
struct TimingEntry {
    total_nanos: AtomicU64,
    count: AtomicU64,
    rows: AtomicU64,
    /// Insertion rank, keeps the report in execution order
    rank: u64,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Profiler {
    pub fn new() -> Self {
        Self {
            timings: DashMap::new(),
            start_time: Instant::now(),
        }
    }

    /// Start timing an operation; recorded when the span is dropped.
    #[must_use]
    pub fn span(&self, name: &str) -> ProfileSpan<'_> {
        ProfileSpan {
            profiler: self,
            name: name.to_string(),
            start: Instant::now(),
            rows: 0,
        }
    }

    /// Record a measurement.
    pub fn record(&self, name: &str, duration: Duration, rows: u64) {
        let rank = self.timings.len() as u64;
        let entry = self
            .timings
            .entry(name.to_string())
            .or_insert_with(|| TimingEntry {
                total_nanos: AtomicU64::new(0),
                count: AtomicU64::new(0),
                rows: AtomicU64::new(0),
                rank,
            });
        entry
            .total_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        entry.count.fetch_add(1, Ordering::Relaxed);
        entry.rows.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.timings.clear();
    }

    #[must_use]
    pub fn report(&self) -> ProfileReport {
        let mut operations: Vec<(u64, OperationTiming)> = self
            .timings
            .iter()
            .map(|entry| {
                let timing = entry.value();
                (
                    timing.rank,
                    OperationTiming {
                        name: entry.key().clone(),
                        duration: Duration::from_nanos(timing.total_nanos.load(Ordering::Relaxed)),
                        count: timing.count.load(Ordering::Relaxed),
                        rows: timing.rows.load(Ordering::Relaxed),
                    },
                )
            })
            .collect();
        operations.sort_by_key(|(rank, _)| *rank);

        ProfileReport {
            total_duration: self.start_time.elapsed(),
            operations: operations.into_iter().map(|(_, op)| op).collect(),
        }
    }
}

/// RAII guard that records timing when dropped.
pub struct ProfileSpan<'a> {
    profiler: &'a Profiler,
    name: String,
    start: Instant,
    rows: u64,
}

impl ProfileSpan<'_> {
    /// Number of rows touched by the operation.
    pub fn rows(&mut self, rows: usize) {
        self.rows = rows as u64;
    }
}

impl Drop for ProfileSpan<'_> {
    fn drop(&mut self) {
        self.profiler
            .record(&self.name, self.start.elapsed(), self.rows);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileReport {
    pub total_duration: Duration,
    pub operations: Vec<OperationTiming>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationTiming {
    pub name: String,
    pub duration: Duration,
    pub count: u64,
    pub rows: u64,
}

impl ProfileReport {
    /// Generate a human-readable summary of the report.
    #[must_use]
    pub fn to_summary(&self) -> String {
        let mut output = format!(
            "\n=== Profiling Report ===\nTotal time: {:.2?}\n\n",
            self.total_duration
        );
        output.push_str(&format!(
            "{:<40} {:>12} {:>8} {:>10}\n",
            "Operation", "Duration", "Count", "Rows"
        ));
        output.push_str(&"-".repeat(73));
        output.push('\n');
        for op in &self.operations {
            output.push_str(&format!(
                "{:<40} {:>12} {:>8} {:>10}\n",
                op.name,
                format_duration(op.duration),
                op.count,
                op.rows
            ));
        }
        output
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn operation(&self, name: &str) -> Option<&OperationTiming> {
        self.operations.iter().find(|op| op.name == name)
    }
}

/// Format a duration for display.
fn format_duration(d: Duration) -> String {
    if d.as_secs() >= 1 {
        format!("{:.2}s", d.as_secs_f64())
    } else if d.as_millis() >= 1 {
        format!("{:.1}ms", d.as_secs_f64() * 1000.0)
    } else {
        format!("{:.0}µs", d.as_secs_f64() * 1_000_000.0)
    }
}
