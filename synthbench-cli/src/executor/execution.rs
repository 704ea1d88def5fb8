//! Reference Execution
//!
//! Drives one run: every reference is loaded and compiled, examples are
//! generated by calling the reference in sandboxed workers, then each
//! candidate is compiled and checked against that batch.
//!
//! ## Data Flow
//!
//! ```text
//! PlannedReference (from planner)
//!        │
//!        ▼
//!  load props/ref.c ──► compile ref.so ──► generate examples (sandboxed)
//!                                                │
//!        ┌───────────────────────────────────────┘
//!        ▼
//!  compile candidates (parallel) ──► evaluate each (sandboxed, sequential)
//!        │
//!        ▼
//!  ReferenceReport
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use synthbench_core::{Evaluator, Generator, Randomiser};
use synthbench_model::{ExampleInstance, FunctionReference, LoadPolicy, load_reference, write_examples};
use synthbench_report::{CandidateReport, ReferenceReport};
use tracing::{info, warn};

use super::report::failure_info;
use crate::config::SynthConfig;
use crate::metrics::measure;
use crate::planner::{ExecutionPlan, PlannedReference};
use crate::supervisor::SandboxRunner;
use crate::toolchain::{CompilationError, Toolchain, library_path};

/// File name of generated examples inside a reference directory
pub const EXAMPLES_FILE: &str = "examples";

/// Configuration for a run
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Examples to generate per reference
    pub examples: usize,
    /// Timeout for a single sandboxed call
    pub timeout: Duration,
    /// Fixed seed; fresh entropy when unset
    pub seed: Option<u64>,
    /// Length cap for strings without a declared size
    pub max_string_length: usize,
    /// Parallel compiler jobs
    pub jobs: usize,
    /// Where compiled libraries go
    pub build_dir: PathBuf,
    /// Where example files go; next to each reference when unset
    pub examples_dir: Option<PathBuf>,
    /// How references with issues are treated
    pub load_policy: LoadPolicy,
    /// Worker executable
    pub worker: PathBuf,
}

impl ExecutionConfig {
    /// Settings from `synth.toml`, with this executable as the worker
    pub fn from_config(config: &SynthConfig) -> std::io::Result<Self> {
        Ok(Self {
            examples: config.runner.examples,
            timeout: config.timeout(),
            seed: config.runner.seed,
            max_string_length: config.runner.max_string_length,
            jobs: config.runner.jobs.unwrap_or(1).max(1),
            build_dir: config.build_dir(),
            examples_dir: config.output.directory.as_ref().map(PathBuf::from),
            load_policy: LoadPolicy::Strict,
            worker: std::env::current_exe()?,
        })
    }
}

/// A loaded reference with its compiled library
#[derive(Debug, Clone)]
pub struct PreparedReference {
    /// Parsed reference
    pub reference: FunctionReference,
    /// Compiled `ref.so`
    pub library: PathBuf,
}

/// Runs references and their candidates in sandboxed workers
pub struct Executor {
    config: ExecutionConfig,
    toolchain: Toolchain,
}

impl Executor {
    /// Create an executor
    pub fn new(config: ExecutionConfig, toolchain: Toolchain) -> Self {
        Self { config, toolchain }
    }

    /// Run configuration
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Execute every reference in the plan
    pub fn execute(&self, plan: &ExecutionPlan) -> Vec<ReferenceReport> {
        let pb = ProgressBar::new(plan.references.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut reports = Vec::with_capacity(plan.references.len());
        for planned in &plan.references {
            pb.set_message(planned.name.clone());
            reports.push(self.execute_reference(planned));
            pb.inc(1);
        }

        pb.finish_with_message("Complete");
        reports
    }

    /// Execute one reference and all its candidates
    pub fn execute_reference(&self, planned: &PlannedReference) -> ReferenceReport {
        let prepared = match self.prepare(&planned.directory) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(reference = %planned.name, error = %format!("{e:#}"), "Could not prepare reference");
                return ReferenceReport::error(&planned.name, format!("{e:#}"));
            }
        };

        let examples = match self.generate(&prepared) {
            Ok(examples) => examples,
            Err(e) => {
                warn!(reference = %planned.name, error = %format!("{e:#}"), "Could not generate examples");
                return ReferenceReport::error(&planned.name, format!("{e:#}"));
            }
        };

        if let Err(e) = self.save_examples(&prepared.reference, &examples) {
            warn!(reference = %planned.name, error = %format!("{e:#}"), "Could not save examples");
        }

        let compiled = self.compile_candidates(prepared.reference.name(), &planned.candidates);
        let candidates = compiled
            .into_iter()
            .map(|(source, library)| {
                self.evaluate_candidate(&prepared, &source, library, &examples)
            })
            .collect();

        ReferenceReport::evaluated(&planned.name, examples.len(), candidates)
    }

    /// Load a reference directory and compile its `ref.c`
    pub fn prepare(&self, directory: &Path) -> anyhow::Result<PreparedReference> {
        let reference = load_reference(directory, self.config.load_policy)
            .with_context(|| format!("could not load reference {}", directory.display()))?;
        let library = self
            .config
            .build_dir
            .join(reference.name())
            .join("ref.so");
        self.toolchain
            .compile(&reference.source_path(), &library)
            .context("could not compile reference")?;
        Ok(PreparedReference { reference, library })
    }

    /// Generate a batch of examples by running the reference
    pub fn generate(&self, prepared: &PreparedReference) -> anyhow::Result<Vec<ExampleInstance>> {
        let signature = &prepared.reference.signature;
        let randomiser = match self.config.seed {
            Some(seed) => Randomiser::seeded(seed),
            None => Randomiser::from_entropy(),
        }
        .with_max_string_length(self.config.max_string_length);

        let mut runner = self.runner(&prepared.library, prepared);
        let examples = Generator::new(signature, randomiser)
            .generate(self.config.examples, &mut runner)
            .with_context(|| format!("could not generate examples for {}", signature.name))?;

        info!(
            reference = %signature.name,
            generated = examples.len(),
            requested = self.config.examples,
            "Generated examples"
        );
        Ok(examples)
    }

    /// Where the example file of `reference` lives
    pub fn examples_path(&self, reference: &FunctionReference) -> PathBuf {
        match &self.config.examples_dir {
            Some(dir) => dir.join(reference.name()).join(EXAMPLES_FILE),
            None => reference.directory.join(EXAMPLES_FILE),
        }
    }

    /// Persist a batch next to its reference (or in the configured directory)
    pub fn save_examples(
        &self,
        reference: &FunctionReference,
        examples: &[ExampleInstance],
    ) -> anyhow::Result<PathBuf> {
        let path = self.examples_path(reference);
        write_examples(&path, &reference.signature, examples)?;
        Ok(path)
    }

    /// Compile candidates in parallel, bounded by the configured job count
    pub fn compile_candidates(
        &self,
        function: &str,
        candidates: &[PathBuf],
    ) -> Vec<(PathBuf, Result<PathBuf, CompilationError>)> {
        let build_dir = self.config.build_dir.join(function);
        let scratch = build_dir.join("patched");
        let compile = |source: &PathBuf| {
            let library = library_path(&build_dir, source);
            let result = self
                .toolchain
                .compile_candidate(source, &library, function, &scratch)
                .map(|_| library);
            (source.clone(), result)
        };

        if self.config.jobs == 1 || candidates.len() <= 1 {
            return candidates.iter().map(compile).collect();
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.jobs.min(candidates.len()))
            .build();
        match pool {
            Ok(pool) => pool.install(|| candidates.par_iter().map(compile).collect()),
            Err(e) => {
                warn!(error = %e, "Failed to build compile pool, compiling serially");
                candidates.iter().map(compile).collect()
            }
        }
    }

    /// Check one compiled candidate against the batch
    pub fn evaluate_candidate(
        &self,
        prepared: &PreparedReference,
        source: &Path,
        library: Result<PathBuf, CompilationError>,
        examples: &[ExampleInstance],
    ) -> CandidateReport {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = source.display().to_string();

        let library = match library {
            Ok(library) => library,
            Err(e) => {
                warn!(candidate = %path, error = %e, "Could not compile candidate");
                return CandidateReport::error(name, path, e.to_string());
            }
        };

        let mut runner = self.runner(&library, prepared);
        let evaluator = Evaluator::new(prepared.reference.name());
        match evaluator.check(examples, &mut runner) {
            Ok(result) => {
                let metrics = match measure(source, &library, &self.toolchain) {
                    Ok(metrics) => Some(metrics),
                    Err(e) => {
                        warn!(candidate = %path, error = %e, "Could not measure candidate");
                        None
                    }
                };
                let failures = result.failures.iter().map(failure_info).collect();
                CandidateReport::evaluated(name, path, result.passes, result.tests, failures, metrics)
            }
            Err(e) => {
                warn!(candidate = %path, error = %e, "Could not evaluate candidate");
                CandidateReport::error(name, path, e.to_string())
            }
        }
    }

    /// Sandboxed runner calling `library` with the reference's signature
    pub fn runner(&self, library: &Path, prepared: &PreparedReference) -> SandboxRunner {
        SandboxRunner::with_worker(
            &self.config.worker,
            library,
            prepared.reference.signature.clone(),
        )
        .timeout(self.config.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config(root: &Path) -> ExecutionConfig {
        ExecutionConfig {
            examples: 3,
            timeout: Duration::from_millis(500),
            seed: Some(1),
            max_string_length: 10,
            jobs: 2,
            build_dir: root.join("build"),
            examples_dir: None,
            load_policy: LoadPolicy::Strict,
            worker: PathBuf::from("/nonexistent/synthbench"),
        }
    }

    fn write_reference(root: &Path) -> PathBuf {
        let dir = root.join("refs").join("add");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("props"), "int add(int a, int b)\n").unwrap();
        fs::write(dir.join("ref.c"), "int add(int a, int b) {\n  return a + b;\n}\n").unwrap();
        dir
    }

    #[test]
    fn test_unloadable_reference_is_error() {
        let root = tempfile::tempdir().unwrap();
        let executor = Executor::new(config(root.path()), Toolchain::default());
        let planned = PlannedReference {
            name: "missing".into(),
            directory: root.path().join("refs").join("missing"),
            candidates: vec![],
        };
        let report = executor.execute_reference(&planned);
        assert_eq!(report.status, synthbench_report::ReferenceStatus::Error);
        assert!(report.error.unwrap().contains("could not load reference"));
    }

    #[test]
    fn test_examples_path() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_reference(root.path());
        let reference = FunctionReference::load(&dir).unwrap();

        let executor = Executor::new(config(root.path()), Toolchain::default());
        assert_eq!(executor.examples_path(&reference), dir.join(EXAMPLES_FILE));

        let mut cfg = config(root.path());
        cfg.examples_dir = Some(root.path().join("out"));
        let executor = Executor::new(cfg, Toolchain::default());
        assert_eq!(
            executor.examples_path(&reference),
            root.path().join("out").join("add").join(EXAMPLES_FILE)
        );
    }

    #[test]
    fn test_uncompilable_candidate_is_error() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_reference(root.path());
        let executor = Executor::new(config(root.path()), Toolchain::default());
        let prepared = PreparedReference {
            reference: FunctionReference::load(&dir).unwrap(),
            library: root.path().join("ref.so"),
        };
        let failure = CompilationError {
            source_path: "add0.s".into(),
            library: "add0.so".into(),
            stderr: "bad instruction".into(),
        };
        let report =
            executor.evaluate_candidate(&prepared, Path::new("impls/add/add0.s"), Err(failure), &[]);
        assert_eq!(report.status, synthbench_report::CandidateStatus::Error);
        assert_eq!(report.name, "add0.s");
        assert!(report.error.unwrap().contains("bad instruction"));
    }

    #[test]
    fn test_unrunnable_candidate_is_error() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_reference(root.path());
        let executor = Executor::new(config(root.path()), Toolchain::default());
        let prepared = PreparedReference {
            reference: FunctionReference::load(&dir).unwrap(),
            library: root.path().join("ref.so"),
        };
        let mut inputs = synthbench_model::Bindings::new();
        inputs.insert("a", synthbench_model::Value::Scalar(synthbench_model::Scalar::Int(1)));
        inputs.insert("b", synthbench_model::Value::Scalar(synthbench_model::Scalar::Int(2)));
        let example = ExampleInstance {
            inputs,
            return_value: synthbench_model::Value::Scalar(synthbench_model::Scalar::Int(3)),
            outputs: synthbench_model::Bindings::new(),
        };
        let report = executor.evaluate_candidate(
            &prepared,
            Path::new("impls/add/add0.s"),
            Ok(root.path().join("add0.so")),
            &[example],
        );
        assert_eq!(report.status, synthbench_report::CandidateStatus::Error);
    }
}
