//! Ordered memory sample logs and their chart series

use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memory::{bytes_to_mb, MemoryUsage};

/// Memory snapshot taken after a file (or an idle pause)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySample {
    /// File name, or an idle-sample label
    pub file: String,
    pub rss: u64,
    pub heap_total: u64,
    pub heap_used: u64,
    pub external: u64,
}

impl MemorySample {
    pub fn new<S: Into<String>>(file: S, usage: MemoryUsage) -> Self {
        Self {
            file: file.into(),
            rss: usage.rss,
            heap_total: usage.heap_total,
            heap_used: usage.heap_used,
            external: usage.external,
        }
    }

    pub fn usage(&self) -> MemoryUsage {
        MemoryUsage {
            rss: self.rss,
            heap_total: self.heap_total,
            heap_used: self.heap_used,
            external: self.external,
        }
    }
}

/// Label of the `n`th (1-based) idle sample
pub fn idle_label(n: u32) -> String {
    format!("timeout-test-{}", n)
}

/// Append-only log of samples; order is the order they were recorded in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleLog {
    samples: Vec<MemorySample>,
}

impl SampleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: MemorySample) {
        self.samples.push(sample);
    }

    /// Append a snapshot under the given label
    pub fn record<S: Into<String>>(&mut self, file: S, usage: MemoryUsage) {
        self.push(MemorySample::new(file, usage));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MemorySample> {
        self.samples.iter()
    }

    pub fn samples(&self) -> &[MemorySample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<MemorySample> {
        self.samples
    }

    /// Per-metric sequences in megabytes, in log order
    pub fn to_series(&self) -> ChartSeries {
        let mut series = ChartSeries::with_capacity(self.len());
        for sample in &self.samples {
            series.labels.push(sample.file.clone());
            series.rss.push(bytes_to_mb(sample.rss));
            series.heap_total.push(bytes_to_mb(sample.heap_total));
            series.heap_used.push(bytes_to_mb(sample.heap_used));
            series.external.push(bytes_to_mb(sample.external));
        }
        series
    }

    /// Write the log as pretty-printed JSON
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl FromIterator<MemorySample> for SampleLog {
    fn from_iter<I: IntoIterator<Item = MemorySample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SampleLog {
    type Item = &'a MemorySample;
    type IntoIter = std::slice::Iter<'a, MemorySample>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Chart-ready data: one label per point and four MB-valued datasets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub rss: Vec<f64>,
    pub heap_total: Vec<f64>,
    pub heap_used: Vec<f64>,
    pub external: Vec<f64>,
}

impl ChartSeries {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            labels: Vec::with_capacity(capacity),
            rss: Vec::with_capacity(capacity),
            heap_total: Vec::with_capacity(capacity),
            heap_used: Vec::with_capacity(capacity),
            external: Vec::with_capacity(capacity),
        }
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Datasets with their legend names, in drawing order
    pub fn datasets(&self) -> [(&'static str, &[f64]); 4] {
        [
            ("RSS (MB)", self.rss.as_slice()),
            ("Heap Total (MB)", self.heap_total.as_slice()),
            ("Heap Used (MB)", self.heap_used.as_slice()),
            ("External (MB)", self.external.as_slice()),
        ]
    }

    /// Largest value across all datasets (0.0 when empty)
    pub fn max_value(&self) -> f64 {
        self.datasets()
            .iter()
            .flat_map(|(_, values)| values.iter().copied())
            .filter(|v| v.is_finite())
            .fold(0.0, f64::max)
    }
}
