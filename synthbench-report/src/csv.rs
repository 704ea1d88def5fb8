//! CSV Output
//!
//! One row per candidate; references without candidates get a single row
//! with an empty candidate column.

use crate::report::{Metrics, Report};

const HEADER: &str =
    "reference,reference_status,examples,candidate,candidate_status,passes,tests,n_chars,text_size,error";

/// Generate a CSV report
pub fn generate_csv_report(report: &Report) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');

    for reference in &report.references {
        let prefix = format!(
            "{},{},{}",
            escape(&reference.name),
            reference.status.label(),
            reference.examples
        );

        if reference.candidates.is_empty() {
            let error = reference.error.as_deref().unwrap_or("");
            out.push_str(&format!("{prefix},,,,,,,{}\n", escape(error)));
            continue;
        }

        for candidate in &reference.candidates {
            let (n_chars, text_size) = metric_columns(candidate.metrics.as_ref());
            let error = candidate.error.as_deref().unwrap_or("");
            out.push_str(&format!(
                "{prefix},{},{},{},{},{n_chars},{text_size},{}\n",
                escape(&candidate.name),
                candidate.status.label(),
                candidate.passes,
                candidate.tests,
                escape(error),
            ));
        }
    }

    out
}

fn metric_columns(metrics: Option<&Metrics>) -> (String, String) {
    match metrics {
        Some(m) => (
            m.n_chars.to_string(),
            m.text_size.map(|s| s.to_string()).unwrap_or_default(),
        ),
        None => (String::new(), String::new()),
    }
}

/// Quote a field if it contains a delimiter, quote or newline
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
