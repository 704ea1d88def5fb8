//! Report Data Structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Complete evaluation report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub meta: ReportMeta,
    pub references: Vec<ReferenceReport>,
    pub summary: ReportSummary,
}

impl Report {
    /// Assemble a report, deriving its summary
    pub fn new(meta: ReportMeta, references: Vec<ReferenceReport>, total_duration_ms: f64) -> Self {
        let summary = ReportSummary::from_references(&references, total_duration_ms);
        Self {
            meta,
            references,
            summary,
        }
    }

    /// Whether any reference could not be loaded, compiled or generated for
    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    pub schema_version: u32,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub config: ReportConfig,
}

/// Run configuration captured in report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub examples: usize,
    pub timeout_ms: u64,
    pub seed: Option<u64>,
    pub cc: String,
    pub cflags: Vec<String>,
}

/// Outcome for one reference function and all its candidates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceReport {
    pub name: String,
    pub status: ReferenceStatus,
    /// Examples generated for this reference
    pub examples: usize,
    pub candidates: Vec<CandidateReport>,
    /// Element-wise best metrics over passing candidates
    pub best: Option<Metrics>,
    pub error: Option<String>,
}

impl ReferenceReport {
    /// A reference that could not be used at all
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ReferenceStatus::Error,
            examples: 0,
            candidates: Vec::new(),
            best: None,
            error: Some(message.into()),
        }
    }

    /// A reference evaluated against `candidates`
    pub fn evaluated(
        name: impl Into<String>,
        examples: usize,
        candidates: Vec<CandidateReport>,
    ) -> Self {
        let status = ReferenceStatus::from_candidates(examples, &candidates);
        let passing: Vec<Metrics> = candidates
            .iter()
            .filter(|c| c.status == CandidateStatus::Passed)
            .filter_map(|c| c.metrics.clone())
            .collect();
        Self {
            name: name.into(),
            status,
            examples,
            candidates,
            best: Metrics::reduce(&passing),
            error: None,
        }
    }
}

/// Reference-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceStatus {
    /// At least one candidate passed every example
    Passed,
    /// No candidate passed
    Failed,
    /// No examples could be generated
    Trivial,
    /// The reference could not be loaded, compiled or run
    Error,
}

impl ReferenceStatus {
    /// Status implied by the generated batch size and candidate outcomes
    pub fn from_candidates(examples: usize, candidates: &[CandidateReport]) -> Self {
        if examples == 0 {
            ReferenceStatus::Trivial
        } else if candidates
            .iter()
            .any(|c| c.status == CandidateStatus::Passed)
        {
            ReferenceStatus::Passed
        } else {
            ReferenceStatus::Failed
        }
    }

    /// Upper-case label for terminal output
    pub fn label(self) -> &'static str {
        match self {
            ReferenceStatus::Passed => "OK",
            ReferenceStatus::Failed => "NOT OK",
            ReferenceStatus::Trivial => "TRIVIAL",
            ReferenceStatus::Error => "ERROR",
        }
    }
}

/// Outcome for one candidate implementation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateReport {
    pub name: String,
    pub path: String,
    pub status: CandidateStatus,
    pub passes: usize,
    pub tests: usize,
    pub failures: Vec<FailureInfo>,
    pub metrics: Option<Metrics>,
    pub error: Option<String>,
}

impl CandidateReport {
    /// A candidate that was executed on every example
    pub fn evaluated(
        name: impl Into<String>,
        path: impl Into<String>,
        passes: usize,
        tests: usize,
        failures: Vec<FailureInfo>,
        metrics: Option<Metrics>,
    ) -> Self {
        let status = if tests == 0 {
            CandidateStatus::Trivial
        } else if passes == tests {
            CandidateStatus::Passed
        } else {
            CandidateStatus::Failed
        };
        Self {
            name: name.into(),
            path: path.into(),
            status,
            passes,
            tests,
            failures,
            metrics,
            error: None,
        }
    }

    /// A candidate that could not be compiled or executed
    pub fn error(
        name: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            status: CandidateStatus::Error,
            passes: 0,
            tests: 0,
            failures: Vec::new(),
            metrics: None,
            error: Some(message.into()),
        }
    }
}

/// Candidate-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    /// Every example matched
    Passed,
    /// At least one example mismatched
    Failed,
    /// No examples were run
    Trivial,
    /// Could not evaluate
    Error,
}

impl CandidateStatus {
    /// Upper-case label for terminal output
    pub fn label(self) -> &'static str {
        match self {
            CandidateStatus::Passed => "OK",
            CandidateStatus::Failed => "NOT OK",
            CandidateStatus::Trivial => "TRIVIAL",
            CandidateStatus::Error => "COULD NOT EVALUATE",
        }
    }
}

/// A mismatching example, rendered in example-file notation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub inputs: String,
    pub expected_return: String,
    pub actual_return: String,
    pub expected_outputs: String,
    pub actual_outputs: String,
}

/// Size metrics of a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Characters in the candidate source
    pub n_chars: usize,
    /// `.text` size of the compiled library, when `size` could report it
    pub text_size: Option<u64>,
}

impl Metrics {
    /// Element-wise minimum, `None` for an empty slice
    pub fn reduce(metrics: &[Metrics]) -> Option<Metrics> {
        let n_chars = metrics.iter().map(|m| m.n_chars).min()?;
        let text_size = metrics.iter().filter_map(|m| m.text_size).min();
        Some(Metrics { n_chars, text_size })
    }
}

/// Report summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_references: usize,
    pub passed: usize,
    pub failed: usize,
    pub trivial: usize,
    pub errors: usize,
    pub total_candidates: usize,
    pub candidates_passed: usize,
    pub total_duration_ms: f64,
}

impl ReportSummary {
    /// Tally reference and candidate statuses
    pub fn from_references(references: &[ReferenceReport], total_duration_ms: f64) -> Self {
        let mut summary = ReportSummary {
            total_references: references.len(),
            total_duration_ms,
            ..Default::default()
        };
        for reference in references {
            match reference.status {
                ReferenceStatus::Passed => summary.passed += 1,
                ReferenceStatus::Failed => summary.failed += 1,
                ReferenceStatus::Trivial => summary.trivial += 1,
                ReferenceStatus::Error => summary.errors += 1,
            }
            summary.total_candidates += reference.candidates.len();
            summary.candidates_passed += reference
                .candidates
                .iter()
                .filter(|c| c.status == CandidateStatus::Passed)
                .count();
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(passes: usize, tests: usize, n_chars: usize) -> CandidateReport {
        CandidateReport::evaluated(
            "c",
            "c.s",
            passes,
            tests,
            Vec::new(),
            Some(Metrics {
                n_chars,
                text_size: Some(n_chars as u64 * 2),
            }),
        )
    }

    #[test]
    fn test_candidate_status() {
        assert_eq!(candidate(3, 3, 1).status, CandidateStatus::Passed);
        assert_eq!(candidate(2, 3, 1).status, CandidateStatus::Failed);
        assert_eq!(candidate(0, 0, 1).status, CandidateStatus::Trivial);
        assert_eq!(
            CandidateReport::error("c", "c.s", "boom").status,
            CandidateStatus::Error
        );
    }

    #[test]
    fn test_reference_status_partitions() {
        let passed = ReferenceReport::evaluated("f", 3, vec![candidate(1, 3, 1), candidate(3, 3, 9)]);
        assert_eq!(passed.status, ReferenceStatus::Passed);
        let failed = ReferenceReport::evaluated("f", 3, vec![candidate(1, 3, 1)]);
        assert_eq!(failed.status, ReferenceStatus::Failed);
        let trivial = ReferenceReport::evaluated("f", 0, vec![candidate(0, 0, 1)]);
        assert_eq!(trivial.status, ReferenceStatus::Trivial);
    }

    #[test]
    fn test_best_metrics_only_from_passing() {
        let report = ReferenceReport::evaluated(
            "f",
            3,
            vec![candidate(3, 3, 40), candidate(1, 3, 5), candidate(3, 3, 20)],
        );
        assert_eq!(
            report.best,
            Some(Metrics {
                n_chars: 20,
                text_size: Some(40)
            })
        );
    }

    #[test]
    fn test_reduce_empty() {
        assert_eq!(Metrics::reduce(&[]), None);
    }

    #[test]
    fn test_summary_counts() {
        let references = vec![
            ReferenceReport::evaluated("a", 3, vec![candidate(3, 3, 1)]),
            ReferenceReport::evaluated("b", 0, vec![]),
            ReferenceReport::error("c", "could not compile"),
        ];
        let summary = ReportSummary::from_references(&references, 1.0);
        assert_eq!(summary.total_references, 3);
        assert_eq!((summary.passed, summary.trivial, summary.errors), (1, 1, 1));
        assert_eq!(summary.candidates_passed, 1);
    }
}
