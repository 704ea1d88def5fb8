//! JSON Output

use crate::report::Report;

/// Generate a prettified JSON report.
///
/// Serializes the evaluation report into machine-readable JSON format.
pub fn generate_json_report(report: &Report) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Read a report back from JSON
pub fn parse_json_report(json: &str) -> Result<Report, serde_json::Error> {
    serde_json::from_str(json)
}
