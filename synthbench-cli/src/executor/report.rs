//! Report Building
//!
//! Wraps per-reference outcomes into a [`Report`] with run metadata.

use chrono::Utc;
use synthbench_core::Failure;
use synthbench_report::{FailureInfo, ReferenceReport, Report, ReportConfig, ReportMeta, SCHEMA_VERSION};

use super::execution::ExecutionConfig;
use crate::config::SynthConfig;

/// Build a complete report from reference outcomes
pub fn build_report(
    references: Vec<ReferenceReport>,
    execution: &ExecutionConfig,
    config: &SynthConfig,
    total_duration_ms: f64,
) -> Report {
    Report::new(build_report_meta(execution, config), references, total_duration_ms)
}

/// Metadata describing how a run was configured
pub fn build_report_meta(execution: &ExecutionConfig, config: &SynthConfig) -> ReportMeta {
    ReportMeta {
        schema_version: SCHEMA_VERSION,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        config: ReportConfig {
            examples: execution.examples,
            timeout_ms: execution.timeout.as_millis() as u64,
            seed: execution.seed,
            cc: config.toolchain.cc.clone(),
            cflags: config.toolchain.cflags.clone(),
        },
    }
}

/// Render an evaluation mismatch for the report
pub fn failure_info(failure: &Failure) -> FailureInfo {
    FailureInfo {
        inputs: failure.example.inputs.to_string(),
        expected_return: failure.example.return_value.to_string(),
        actual_return: failure.actual_return.to_string(),
        expected_outputs: failure.example.outputs.to_string(),
        actual_outputs: failure.actual_outputs.to_string(),
    }
}
