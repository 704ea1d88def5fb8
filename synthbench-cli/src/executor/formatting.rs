//! Output Formatting
//!
//! Human-readable output for evaluation reports: one block per reference
//! listing each candidate's score, followed by a run summary.

use synthbench_report::{CandidateReport, CandidateStatus, Metrics, ReferenceReport, Report};

/// Format a report for human-readable terminal display
///
/// # Arguments
/// * `report` - Complete evaluation report
/// * `show_failures` - List each mismatching example under its candidate
///
/// # Returns
/// Formatted string suitable for terminal output
pub fn format_human_output(report: &Report, show_failures: bool) -> String {
    let mut output = String::new();

    output.push('\n');
    output.push_str("Synthbench Results\n");
    output.push_str(&"=".repeat(60));
    output.push_str("\n\n");

    for reference in &report.references {
        format_reference(&mut output, reference, show_failures);
        output.push('\n');
    }

    let s = &report.summary;
    output.push_str(&"-".repeat(60));
    output.push('\n');
    output.push_str(&format!(
        "Summary: {} references: {} OK, {} NOT OK, {} TRIVIAL, {} ERROR\n",
        s.total_references, s.passed, s.failed, s.trivial, s.errors
    ));
    output.push_str(&format!(
        "         {}/{} candidates passed in {:.1}s\n",
        s.candidates_passed,
        s.total_candidates,
        s.total_duration_ms / 1000.0
    ));

    output
}

fn format_reference(output: &mut String, reference: &ReferenceReport, show_failures: bool) {
    output.push_str(&format!("testing {}:\n", reference.name));

    if let Some(error) = &reference.error {
        output.push_str(&format!("  could not create reference: {error}\n"));
    }

    for candidate in &reference.candidates {
        format_candidate(output, candidate, show_failures);
    }

    let passing = reference
        .candidates
        .iter()
        .filter(|c| c.status == CandidateStatus::Passed)
        .count();
    output.push_str(&format!(
        "{}: ({}/{}) {}",
        reference.name,
        passing,
        reference.candidates.len(),
        reference.status.label()
    ));
    if let Some(best) = &reference.best {
        output.push_str(&format!("  best: {}", format_metrics(best)));
    }
    output.push('\n');
}

fn format_candidate(output: &mut String, candidate: &CandidateReport, show_failures: bool) {
    if candidate.status == CandidateStatus::Error {
        output.push_str(&format!(
            "  {}: {}\n",
            candidate.name,
            candidate.status.label()
        ));
        if let Some(error) = &candidate.error {
            for line in error.lines() {
                output.push_str(&format!("      {line}\n"));
            }
        }
        return;
    }

    output.push_str(&format!(
        "  {}: passed {}/{} tests ({})",
        candidate.name,
        candidate.passes,
        candidate.tests,
        candidate.status.label()
    ));
    if let Some(metrics) = &candidate.metrics {
        output.push_str(&format!("  {}", format_metrics(metrics)));
    }
    output.push('\n');

    if show_failures {
        for failure in &candidate.failures {
            output.push_str(&format!(
                "   >> input {} produced incorrect values (expected vs. actual); {} vs. {}; {} vs. {}\n",
                failure.inputs,
                failure.expected_return,
                failure.actual_return,
                failure.expected_outputs,
                failure.actual_outputs
            ));
        }
    }
}

fn format_metrics(metrics: &Metrics) -> String {
    match metrics.text_size {
        Some(size) => format!("chars: {}  text: {} bytes", metrics.n_chars, size),
        None => format!("chars: {}", metrics.n_chars),
    }
}
