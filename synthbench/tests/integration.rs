//! Integration tests for Synthbench
//!
//! These tests drive real compiled C through the `synthbench` binary acting
//! as the sandbox worker. They are skipped when no C compiler is on `PATH`.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use synthbench::{
    CandidateStatus, ExecutionConfig, Executor, LoadPolicy, ReferenceStatus, Scalar, Toolchain,
    Value, build_plan, parse_json_report, read_examples,
};
use tempfile::TempDir;

const WORKER: &str = env!("CARGO_BIN_EXE_synthbench");

fn have_cc() -> bool {
    Command::new("cc")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

macro_rules! require_cc {
    () => {
        if !have_cc() {
            eprintln!("skipping: no C compiler on PATH");
            return;
        }
    };
}

struct Fixture {
    root: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    fn refs(&self) -> PathBuf {
        self.root.path().join("refs")
    }

    fn impls(&self) -> PathBuf {
        self.root.path().join("impls")
    }

    fn reference(&self, name: &str, props: &str, code: &str) -> PathBuf {
        let dir = self.refs().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("props"), props).unwrap();
        fs::write(dir.join("ref.c"), code).unwrap();
        dir
    }

    fn candidate(&self, reference: &str, file: &str, code: &str) -> PathBuf {
        let dir = self.impls().join(reference);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(file);
        fs::write(&path, code).unwrap();
        path
    }

    fn config(&self, examples: usize) -> ExecutionConfig {
        ExecutionConfig {
            examples,
            timeout: Duration::from_secs(2),
            seed: Some(42),
            max_string_length: 20,
            jobs: 2,
            build_dir: self.root.path().join("build"),
            examples_dir: None,
            load_policy: LoadPolicy::Strict,
            worker: PathBuf::from(WORKER),
        }
    }

    fn executor(&self, examples: usize) -> Executor {
        Executor::new(self.config(examples), Toolchain::default())
    }
}

const ADD_PROPS: &str = "int add(int a, int b)\n";
const ADD_REF: &str = "int add(int a, int b) {\n    return a + b;\n}\n";

/// Passing, failing and crashing candidates are scored independently
#[test]
fn test_run_scores_each_candidate() {
    require_cc!();
    let fx = Fixture::new();
    fx.reference("add", ADD_PROPS, ADD_REF);
    fx.candidate("add", "add0.c", "int add(int a, int b) { return b + a; }\n");
    fx.candidate("add", "add1.c", "int add(int a, int b) { return a - b; }\n");
    fx.candidate(
        "add",
        "add2.c",
        "int add(int a, int b) { return *(volatile int *)0; }\n",
    );
    fx.candidate("add", "add3.c", "this is not C\n");

    let plan = build_plan(&fx.refs(), Some(&fx.impls()), None).unwrap();
    let reports = fx.executor(5).execute(&plan);

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.examples, 5);
    assert_eq!(report.status, ReferenceStatus::Passed);

    let statuses: Vec<CandidateStatus> = report.candidates.iter().map(|c| c.status).collect();
    assert_eq!(statuses[0], CandidateStatus::Passed);
    assert_eq!(statuses[2], CandidateStatus::Error);
    assert_eq!(statuses[3], CandidateStatus::Error);
    assert!(report.best.is_some());

    // a - b agrees with a + b only when b == 0
    assert_eq!(statuses[1], CandidateStatus::Failed);
}

/// Generated examples persist next to the reference and round-trip
#[test]
fn test_examples_written_and_reloaded() {
    require_cc!();
    let fx = Fixture::new();
    let dir = fx.reference("add", ADD_PROPS, ADD_REF);

    let executor = fx.executor(4);
    let prepared = executor.prepare(&dir).unwrap();
    let examples = executor.generate(&prepared).unwrap();
    let path = executor.save_examples(&prepared.reference, &examples).unwrap();

    assert_eq!(path, dir.join("examples"));
    let (_, reloaded) = read_examples(&path).unwrap();
    assert_eq!(reloaded, examples);
    for example in &examples {
        let a = example.inputs.get("a").and_then(Value::as_int).unwrap();
        let b = example.inputs.get("b").and_then(Value::as_int).unwrap();
        assert_eq!(example.return_value, Value::Scalar(Scalar::Int((a + b) as i32)));
    }
}

/// Parameter constraints bound every generated input
#[test]
fn test_constraints_respected() {
    require_cc!();
    let fx = Fixture::new();
    let dir = fx.reference(
        "clamp",
        "int clamp(int x, int y)\nconstraint x > 5\nconstraint { y != x }\n",
        "int clamp(int x, int y) {\n    return x > y ? x : y;\n}\n",
    );

    let executor = fx.executor(6);
    let prepared = executor.prepare(&dir).unwrap();
    let examples = executor.generate(&prepared).unwrap();

    assert!(!examples.is_empty());
    for example in &examples {
        let x = example.inputs.get("x").and_then(Value::as_int).unwrap();
        let y = example.inputs.get("y").and_then(Value::as_int).unwrap();
        assert!(x > 5);
        assert_ne!(x, y);
    }
}

/// NaN results compare equal to NaN
#[test]
fn test_nan_matches_nan() {
    require_cc!();
    let fx = Fixture::new();
    fx.reference(
        "nan",
        "double nan(double x)\n",
        "double nan(double x) {\n    return (x - x) / (x - x);\n}\n",
    );
    fx.candidate(
        "nan",
        "nan0.c",
        "double nan(double x) { double z = 0.0; return z / z; }\n",
    );

    let plan = build_plan(&fx.refs(), Some(&fx.impls()), None).unwrap();
    let reports = fx.executor(3).execute(&plan);

    assert_eq!(reports[0].candidates[0].status, CandidateStatus::Passed);
}

/// Sized strings stay under their declared capacity
#[test]
fn test_string_capacity() {
    require_cc!();
    let fx = Fixture::new();
    let dir = fx.reference(
        "length",
        "int length(char *s)\nsize s, 10\n",
        "#include <string.h>\nint length(char *s) {\n    return (int)strlen(s);\n}\n",
    );

    let executor = fx.executor(8);
    let prepared = executor.prepare(&dir).unwrap();
    let examples = executor.generate(&prepared).unwrap();

    assert_eq!(examples.len(), 8);
    for example in &examples {
        let len = example.inputs.get("s").and_then(Value::len).unwrap();
        assert!(len < 10);
        assert_eq!(example.return_value, Value::Scalar(Scalar::Int(len as i32)));
    }
}

/// Output arrays sized by another parameter are recorded and compared
#[test]
fn test_output_array() {
    require_cc!();
    let fx = Fixture::new();
    fx.reference(
        "scale",
        "void scale(int *xs, int n)\nsize xs, n\noutput xs\n",
        "void scale(int *xs, int n) {\n    for (int i = 0; i < n; i++) xs[i] *= 2;\n}\n",
    );
    fx.candidate(
        "scale",
        "scale0.c",
        "void scale(int *xs, int n) { for (int i = 0; i < n; i++) xs[i] += xs[i]; }\n",
    );
    fx.candidate(
        "scale",
        "scale1.c",
        "void scale(int *xs, int n) { for (int i = 0; i < n; i++) xs[i] *= 3; }\n",
    );

    let plan = build_plan(&fx.refs(), Some(&fx.impls()), None).unwrap();
    let reports = fx.executor(6).execute(&plan);
    let candidates = &reports[0].candidates;

    assert_eq!(candidates[0].status, CandidateStatus::Passed);
    assert_eq!(candidates[0].passes, 6);
    assert_eq!(candidates[1].status, CandidateStatus::Failed);
}

/// A candidate that never returns is killed and reported
#[test]
fn test_hanging_candidate_times_out() {
    require_cc!();
    let fx = Fixture::new();
    fx.reference("add", ADD_PROPS, ADD_REF);
    fx.candidate("add", "add0.c", "int add(int a, int b) { for (;;) {} }\n");

    let mut config = fx.config(2);
    config.timeout = Duration::from_millis(500);
    let executor = Executor::new(config, Toolchain::default());
    let plan = build_plan(&fx.refs(), Some(&fx.impls()), None).unwrap();
    let reports = executor.execute(&plan);

    assert_eq!(reports[0].examples, 2);
    assert_eq!(reports[0].candidates[0].status, CandidateStatus::Error);
    assert_eq!(reports[0].status, ReferenceStatus::Failed);
}

/// Assembly without a `.globl` directive is patched and retried
#[cfg(target_arch = "x86_64")]
#[test]
fn test_assembly_candidate_without_globl() {
    require_cc!();
    let fx = Fixture::new();
    fx.reference("add", ADD_PROPS, ADD_REF);
    fx.candidate("add", "add0.s", "add:\n\tleal (%rdi,%rsi), %eax\n\tret\n");

    let plan = build_plan(&fx.refs(), Some(&fx.impls()), None).unwrap();
    let reports = fx.executor(4).execute(&plan);

    let candidate = &reports[0].candidates[0];
    assert_eq!(candidate.status, CandidateStatus::Passed, "{:?}", candidate.error);
    assert!(candidate.metrics.as_ref().unwrap().n_chars > 0);
}

/// A reference that does not compile is an error, not a crash
#[test]
fn test_broken_reference() {
    require_cc!();
    let fx = Fixture::new();
    fx.reference("add", ADD_PROPS, "int add(int a, int b) {\n    return a +;\n}\n");

    let plan = build_plan(&fx.refs(), Some(&fx.impls()), None).unwrap();
    let reports = fx.executor(3).execute(&plan);

    assert_eq!(reports[0].status, ReferenceStatus::Error);
    assert!(reports[0].error.as_deref().unwrap().contains("could not compile"));
}

/// The binary emits a parsable JSON report and honours `--strict`
#[test]
fn test_cli_json_report() {
    require_cc!();
    let fx = Fixture::new();
    fx.reference("add", ADD_PROPS, ADD_REF);
    fx.reference("broken", "int broken(\n", "int broken(void) { return 0; }\n");
    fx.candidate("add", "add0.c", "int add(int a, int b) { return a + b; }\n");

    let run = |strict: bool| {
        let mut cmd = Command::new(WORKER);
        cmd.current_dir(fx.root.path())
            .arg("run")
            .arg(fx.refs())
            .arg(fx.impls())
            .args(["--format", "json", "-n", "3", "--seed", "1"])
            .arg("--build-dir")
            .arg(fx.root.path().join("build"));
        if strict {
            cmd.arg("--strict");
        }
        cmd.output().unwrap()
    };

    let output = run(false);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report = parse_json_report(&String::from_utf8_lossy(&output.stdout)).unwrap();
    assert_eq!(report.summary.total_references, 2);
    assert_eq!(report.summary.passed, 1);
    assert_eq!(report.summary.errors, 1);
    assert_eq!(report.meta.config.seed, Some(1));

    assert_eq!(run(true).status.code(), Some(1));
}

/// `check` lists issues without compiling anything
#[test]
fn test_cli_check() {
    let fx = Fixture::new();
    fx.reference(
        "sum",
        "int sum(int *xs)\n",
        "int sum(int *xs) {\n    return xs[0];\n}\n",
    );

    let output = Command::new(WORKER)
        .current_dir(fx.root.path())
        .arg("check")
        .arg(fx.refs())
        .output()
        .unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("sum: NOT OK"));
    assert!(stdout.contains("All unterminated arrays must be given a size"));
}
