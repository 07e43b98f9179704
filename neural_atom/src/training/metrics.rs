//! Scalar summaries.
//!
//! The controller writes named scalars through a [`MetricsSink`]. The default
//! sink appends JSON lines to a file; [`MemoryMetricsSink`] keeps them in
//! memory for inspection.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{NeuralAtomError, Result};

/// One scalar observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    /// Metric name.
    pub name: String,
    /// Value.
    pub value: f32,
    /// Global step.
    pub step: usize,
}

/// Destination for scalar summaries.
pub trait MetricsSink: Send {
    /// Record `value` for `name` at `step`.
    fn add_scalar(&mut self, name: &str, value: f32, step: usize) -> Result<()>;

    /// Flush buffered records.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per line.
pub struct JsonlMetricsSink {
    writer: BufWriter<File>,
}

impl JsonlMetricsSink {
    /// Open (or create) `path` for appending, creating parent directories.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Read every record from a JSON-lines file.
    pub fn read_all(path: &Path) -> Result<Vec<ScalarRecord>> {
        fs::read_to_string(path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(NeuralAtomError::from))
            .collect()
    }
}

impl MetricsSink for JsonlMetricsSink {
    fn add_scalar(&mut self, name: &str, value: f32, step: usize) -> Result<()> {
        let record = ScalarRecord {
            name: name.to_string(),
            value,
            step,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for JsonlMetricsSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Keeps records in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetricsSink {
    records: Arc<Mutex<Vec<ScalarRecord>>>,
}

impl MemoryMetricsSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record so far.
    pub fn records(&self) -> Vec<ScalarRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Records with the given name, in arrival order.
    pub fn values(&self, name: &str) -> Vec<(usize, f32)> {
        self.records()
            .into_iter()
            .filter(|r| r.name == name)
            .map(|r| (r.step, r.value))
            .collect()
    }
}

impl MetricsSink for MemoryMetricsSink {
    fn add_scalar(&mut self, name: &str, value: f32, step: usize) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| NeuralAtomError::InvalidData("metrics buffer poisoned".to_string()))?;
        records.push(ScalarRecord {
            name: name.to_string(),
            value,
            step,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_jsonl_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("scalars.jsonl");
        {
            let mut sink = JsonlMetricsSink::create(&path).unwrap();
            sink.add_scalar("specular_loss", 0.5, 1).unwrap();
            sink.add_scalar("specular_psnr", 12.0, 1).unwrap();
            sink.flush().unwrap();
        }

        let records = JsonlMetricsSink::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "specular_loss");
        assert_eq!(records[1].value, 12.0);
        assert_eq!(records[1].step, 1);
    }

    #[test]
    fn test_memory_sink_shared_between_clones() {
        let sink = MemoryMetricsSink::new();
        let mut writer = sink.clone();
        writer.add_scalar("a", 1.0, 3).unwrap();
        writer.add_scalar("b", 2.0, 3).unwrap();
        writer.add_scalar("a", 4.0, 5).unwrap();

        assert_eq!(sink.records().len(), 3);
        assert_eq!(sink.values("a"), vec![(3, 1.0), (5, 4.0)]);
    }
}
