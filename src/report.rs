use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::recipe::Methodology;

/// Per-file outcome classification.
///
/// Skipped (already-processed) files are counted separately from errors;
/// they are excluded from the output but are not failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Processed,
    Skipped,
    Errored,
}

/// Outcome of transforming a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: FileStatus,
    pub message: String,
    /// Output entry name, present only for processed files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    /// Injection steps whose anchor was not found.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub anchor_misses: Vec<String>,
}

/// Aggregate report for one processing run.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub methodology: Methodology,
    pub timestamp: DateTime<Utc>,
    pub processed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub total: usize,
    pub files: Vec<FileReport>,
}

impl RunSummary {
    pub fn new(methodology: Methodology) -> Self {
        Self {
            methodology,
            timestamp: Utc::now(),
            processed: 0,
            skipped: 0,
            errored: 0,
            total: 0,
            files: Vec::new(),
        }
    }

    pub fn push(&mut self, report: FileReport) {
        match report.status {
            FileStatus::Processed => self.processed += 1,
            FileStatus::Skipped => self.skipped += 1,
            FileStatus::Errored => self.errored += 1,
        }
        self.total += 1;
        self.files.push(report);
    }

    /// Print only the aggregate counts line.
    pub fn print_counts(&self) {
        println!(
            "Processed: {}  Skipped: {}  Errors: {}  Total: {}",
            self.processed, self.skipped, self.errored, self.total
        );
    }

    /// Print the per-file lines and aggregate counts to stdout.
    pub fn print(&self) {
        for report in &self.files {
            let symbol = match report.status {
                FileStatus::Processed => "✅",
                FileStatus::Skipped => "⚠️ ",
                FileStatus::Errored => "❌",
            };
            println!("{} {}", symbol, report.message);
            for step in &report.anchor_misses {
                println!("   anchor not found: {}", step);
            }
        }
        println!();
        self.print_counts();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: FileStatus) -> FileReport {
        FileReport {
            path: PathBuf::from("Strategy.mq5"),
            status,
            message: "test".to_string(),
            output_name: None,
            anchor_misses: Vec::new(),
        }
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::new(Methodology::Gerard);
        summary.push(report(FileStatus::Processed));
        summary.push(report(FileStatus::Processed));
        summary.push(report(FileStatus::Skipped));
        summary.push(report(FileStatus::Errored));

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.total, 4);
    }

    #[test]
    fn test_summary_serializes_to_json() {
        let mut summary = RunSummary::new(Methodology::Benjamin);
        summary.push(report(FileStatus::Processed));

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"methodology\":\"benjamin\""));
        assert!(json.contains("\"processed\":1"));
        // Empty miss lists are elided from the JSON
        assert!(!json.contains("anchor_misses"));
    }
}
