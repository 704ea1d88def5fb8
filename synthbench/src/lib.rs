#![warn(missing_docs)]
//! # Synthbench
//!
//! Differential testing of synthesized C and assembly functions against
//! reference implementations.
//!
//! Synthbench turns an annotated C reference into a batch of input/output
//! examples and scores candidate implementations against that batch:
//! - **Constraint-Driven Generation**: Random inputs honour declared sizes, ranges and predicates
//! - **Process Isolation**: Every call into compiled code runs in a worker that may crash, hang or abort safely
//! - **Zero-Copy IPC**: Supervisor-worker communication uses rkyv frames over dedicated pipes
//! - **Differential Evaluation**: NaN-aware comparison of return values and output parameters
//! - **Plain-Text Examples**: Batches persist in a human-readable format that round-trips exactly
//! - **Reports**: Human, JSON and CSV output with per-candidate size metrics
//!
//! ## Reference Layout
//!
//! ```text
//! refs/add/props    int add(int a, int b)
//!                   constraint a >= 0
//! refs/add/ref.c    int add(int a, int b) { return a + b; }
//! impls/add/add0.s  candidate implementations named after the reference
//! ```
//!
//! ## Library Use
//!
//! ```ignore
//! use synthbench::{Evaluator, Generator, Randomiser, SandboxRunner, load_reference, LoadPolicy};
//!
//! let reference = load_reference("refs/add", LoadPolicy::Strict)?;
//! let mut runner = SandboxRunner::new("build/add/ref.so", reference.signature.clone())?;
//! let examples = Generator::new(&reference.signature, Randomiser::seeded(7))
//!     .generate(50, &mut runner)?;
//! ```

// Re-export model types
pub use synthbench_model::{
    Bindings, CType, Comparison, Constraint, ExampleInstance, FunctionReference, FunctionSignature,
    LoadPolicy, ModelError, ParseError, ParseIssue, Parameter, Primitive, Scalar, SignatureLine,
    SizeSpec, Value, load_reference, read_examples, write_examples,
};

// Re-export execution and evaluation
pub use synthbench_core::{
    EvaluateError, EvaluationResult, Evaluator, Failure, GenerateError, Generator, Invocation,
    Invoke, Randomiser,
};

// Re-export reporting
pub use synthbench_report::{
    CandidateReport, CandidateStatus, Metrics, OutputFormat, ReferenceReport, ReferenceStatus,
    Report, parse_json_report,
};

// Re-export the runner and toolchain
pub use synthbench_cli::{
    CompilationError, ExecutionConfig, ExecutionPlan, Executor, PlannedReference, SandboxRunner,
    SupervisorError, SynthConfig, Toolchain, build_plan,
};

/// Run the Synthbench CLI.
///
/// The `synthbench` binary is a thin wrapper around this:
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     synthbench::run()
/// }
/// ```
pub use synthbench_cli::run;
