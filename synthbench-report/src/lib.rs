#![warn(missing_docs)]
//! Synthbench Report - Evaluation Reports
//!
//! Generates various output formats:
//! - JSON (machine-readable)
//! - CSV (spreadsheet-compatible, one row per candidate)
//!
//! Human-readable terminal output lives with the CLI.

mod csv;
mod json;
mod report;

pub use csv::generate_csv_report;
pub use json::{generate_json_report, parse_json_report};
pub use report::{
    CandidateReport, CandidateStatus, FailureInfo, Metrics, ReferenceReport, ReferenceStatus,
    Report, ReportConfig, ReportMeta, ReportSummary,
};

/// Schema version written into report metadata
pub const SCHEMA_VERSION: u32 = 1;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON with full schema
    Json,
    /// CSV for spreadsheets
    Csv,
    /// Human-readable terminal output
    Human,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("text".parse::<OutputFormat>(), Ok(OutputFormat::Human));
        assert!("html".parse::<OutputFormat>().is_err());
    }
}
