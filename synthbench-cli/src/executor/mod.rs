//! Run Executor
//!
//! Generates examples from references and evaluates candidates against
//! them, every foreign call going through a sandboxed worker.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ExecutionPlan (from planner)
//!       │
//!       ▼
//! ┌─────────────┐
//! │  execution  │  Compile, generate examples, evaluate candidates
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │   report    │  Build Report with run metadata
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ formatting  │  Human-readable output
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`execution`] - Reference preparation, generation and candidate evaluation
//! - [`report`] - Report building and failure rendering
//! - [`formatting`] - Human-readable output formatting

mod execution;
mod formatting;
mod report;

// Re-export public API
pub use execution::{EXAMPLES_FILE, ExecutionConfig, Executor, PreparedReference};
pub use formatting::format_human_output;
pub use report::{build_report, build_report_meta, failure_info};
