//! Per-phase profiling captures and the combined profile file.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Aggregated timing for one profiled function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub function: String,
    pub calls: u64,
    pub total_ms: f64,
}

/// Profiling capture for a single phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub phase: String,
    pub entries: Vec<ProfileEntry>,
}

impl ProfileStats {
    pub fn new(phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, function: impl Into<String>, calls: u64, total_ms: f64) {
        self.entries.push(ProfileEntry {
            function: function.into(),
            calls,
            total_ms,
        });
    }

    pub fn total_ms(&self) -> f64 {
        self.entries.iter().map(|e| e.total_ms).sum()
    }
}

/// Several phase captures merged into one profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedProfile {
    /// Phases merged, in capture order
    pub phases: Vec<String>,
    /// Per-function totals, most expensive first
    pub entries: Vec<ProfileEntry>,
}

/// Merge captures, summing calls and time per function
pub fn merge_profile_stats(stats: &[ProfileStats]) -> CombinedProfile {
    let mut totals: BTreeMap<&str, (u64, f64)> = BTreeMap::new();
    for capture in stats {
        for entry in &capture.entries {
            let slot = totals.entry(entry.function.as_str()).or_default();
            slot.0 += entry.calls;
            slot.1 += entry.total_ms;
        }
    }

    let mut entries: Vec<ProfileEntry> = totals
        .into_iter()
        .map(|(function, (calls, total_ms))| ProfileEntry {
            function: function.to_string(),
            calls,
            total_ms,
        })
        .collect();
    entries.sort_by(|a, b| b.total_ms.total_cmp(&a.total_ms));

    CombinedProfile {
        phases: stats.iter().map(|s| s.phase.clone()).collect(),
        entries,
    }
}

/// Combine captures into a single profile file at `output`.
///
/// Nothing is written when there are no captures; returns whether a file was written.
pub fn combine_profile_stats(stats: &[ProfileStats], output: &Path) -> Result<bool> {
    if stats.is_empty() {
        return Ok(false);
    }

    let combined = merge_profile_stats(stats);
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(output)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &combined)?;
    writer.flush()?;

    info!(
        "Wrote combined profile of {} phases to {}",
        combined.phases.len(),
        output.display()
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn capture(phase: &str, entries: &[(&str, u64, f64)]) -> ProfileStats {
        let mut stats = ProfileStats::new(phase);
        for (function, calls, ms) in entries {
            stats.record(*function, *calls, *ms);
        }
        stats
    }

    #[test]
    fn test_merge_sums_per_function() {
        let stats = vec![
            capture("a", &[("read_dmm", 2, 10.0), ("settle", 1, 50.0)]),
            capture("b", &[("read_dmm", 3, 15.0)]),
        ];
        let combined = merge_profile_stats(&stats);

        assert_eq!(combined.phases, vec!["a", "b"]);
        assert_eq!(combined.entries.len(), 2);
        assert_eq!(combined.entries[0].function, "settle");
        let dmm = &combined.entries[1];
        assert_eq!(dmm.function, "read_dmm");
        assert_eq!(dmm.calls, 5);
        assert!((dmm.total_ms - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_combine_writes_file() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("profiles").join("run.json");
        let stats = vec![capture("a", &[("f", 1, 1.5)])];

        assert!(combine_profile_stats(&stats, &output).unwrap());

        let content = std::fs::read_to_string(&output).unwrap();
        let combined: CombinedProfile = serde_json::from_str(&content).unwrap();
        assert_eq!(combined.phases, vec!["a"]);
        assert_eq!(combined.entries[0].calls, 1);
    }

    #[test]
    fn test_combine_empty_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let output = temp.path().join("run.json");
        assert!(!combine_profile_stats(&[], &output).unwrap());
        assert!(!output.exists());
    }

    #[test]
    fn test_total_ms() {
        let stats = capture("a", &[("f", 1, 1.0), ("g", 2, 2.5)]);
        assert!((stats.total_ms() - 3.5).abs() < f64::EPSILON);
    }
}
