#![warn(missing_docs)]
//! Synthbench CLI Library
//!
//! Command line front end for synthesizing examples from C reference
//! functions and scoring candidate implementations against them. Every call
//! into compiled code happens in a worker process: the same binary started
//! with the hidden `--synth-worker` flag.
//!
//! # Example
//!
//! ```ignore
//! fn main() -> anyhow::Result<()> {
//!     synthbench_cli::run()
//! }
//! ```

mod asm;
mod config;
mod executor;
mod metrics;
mod planner;
mod supervisor;
mod toolchain;

pub use asm::{FunctionAsm, extract_function};
pub use config::*;
pub use executor::{
    EXAMPLES_FILE, ExecutionConfig, Executor, PreparedReference, build_report, build_report_meta,
    failure_info, format_human_output,
};
pub use metrics::measure;
pub use planner::{CANDIDATE_EXTENSIONS, ExecutionPlan, PlannedReference, build_plan, find_candidates};
pub use supervisor::*;
pub use toolchain::{CompilationError, Toolchain, ensure_globl, is_assembly, library_path};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use synthbench_core::WorkerMain;
use synthbench_model::{FunctionReference, LoadPolicy, SignatureLine, read_examples, write_examples};
use synthbench_report::{
    OutputFormat, ReferenceReport, Report, generate_csv_report, generate_json_report,
};

/// Synthbench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "synthbench")]
#[command(
    author,
    version,
    about = "Synthbench - example synthesis and differential testing for C functions"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Output format: human, json, csv
    #[arg(long, global = true)]
    pub format: Option<String>,

    /// Output file (stdout if not specified)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Examples to generate per reference
    #[arg(short = 'n', long, global = true)]
    pub num_examples: Option<usize>,

    /// Timeout for a single call into compiled code (e.g., "2s", "500ms")
    #[arg(long, global = true)]
    pub timeout: Option<String>,

    /// Fixed random seed
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Length cap for strings without a declared size
    #[arg(long, global = true)]
    pub max_string_length: Option<usize>,

    /// Number of parallel compiler jobs
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// C compiler driver
    #[arg(long, global = true)]
    pub cc: Option<String>,

    /// Where compiled libraries are placed
    #[arg(long, global = true)]
    pub build_dir: Option<PathBuf>,

    /// Drop invalid `output`/`size` declarations instead of rejecting a reference
    #[arg(long, global = true)]
    pub auto_fix: bool,

    /// List mismatching examples in human output
    #[arg(long, global = true)]
    pub show_failures: bool,

    /// Exit with status 1 when any reference could not be evaluated
    #[arg(long, global = true)]
    pub strict: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Internal: Run as worker process (used by supervisor)
    #[arg(long, hide = true)]
    pub synth_worker: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate examples for every reference and score all candidates
    Run {
        /// Directory holding one subdirectory per reference
        references: PathBuf,
        /// Directory holding `<reference>/<reference>*.{c,s,S}` candidates
        implementations: PathBuf,
        /// Only run references whose name matches this regex
        #[arg(long, default_value = ".*")]
        filter: String,
    },
    /// Generate examples for one reference
    Generate {
        /// Reference directory
        reference: PathBuf,
    },
    /// Score one candidate against previously generated examples
    Evaluate {
        /// Reference directory
        reference: PathBuf,
        /// Candidate source (.c, .s or .S)
        candidate: PathBuf,
        /// Example file; defaults to the reference's generated examples
        #[arg(long)]
        examples: Option<PathBuf>,
    },
    /// List the issues of every reference
    Check {
        /// Directory holding one subdirectory per reference
        references: PathBuf,
        /// Only check references whose name matches this regex
        #[arg(long, default_value = ".*")]
        filter: String,
    },
    /// Print the compiled assembly of a reference function
    Asm {
        /// Reference directory
        reference: PathBuf,
    },
    /// Write a default synth.toml to the current directory
    Init,
}

/// Run the Synthbench CLI with the process arguments.
///
/// # Returns
/// Returns `Ok(())` on success, or an error if something goes wrong.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the Synthbench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // Handle worker mode first (before any other initialization)
    if cli.synth_worker {
        return run_worker_mode();
    }

    // Initialize logging
    let filter = if cli.verbose {
        "synthbench=debug"
    } else {
        "synthbench=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Discover synth.toml configuration (CLI flags override)
    let mut config = SynthConfig::discover().unwrap_or_default();
    apply_overrides(&cli, &mut config)?;

    // Parse output format
    let format: OutputFormat = match &cli.format {
        Some(format) => format.parse().map_err(|e: String| anyhow::anyhow!(e))?,
        None => config.output.format.parse().unwrap_or(OutputFormat::Human),
    };

    match &cli.command {
        Some(Commands::Run {
            references,
            implementations,
            filter,
        }) => run_references(&cli, &config, format, references, implementations, filter),
        Some(Commands::Generate { reference }) => generate_examples(&cli, &config, reference),
        Some(Commands::Evaluate {
            reference,
            candidate,
            examples,
        }) => evaluate_candidate(&cli, &config, format, reference, candidate, examples.as_deref()),
        Some(Commands::Check { references, filter }) => check_references(&cli, references, filter),
        Some(Commands::Asm { reference }) => print_asm(&cli, &config, reference),
        Some(Commands::Init) => init_config(),
        None => {
            bail!("no command given; see `synthbench --help`")
        }
    }
}

/// Run as a worker process (IPC mode)
fn run_worker_mode() -> anyhow::Result<()> {
    let mut worker = WorkerMain::new();
    worker
        .run()
        .map_err(|e| anyhow::anyhow!("Worker error: {}", e))
}

/// Layer CLI flags over synth.toml values.
fn apply_overrides(cli: &Cli, config: &mut SynthConfig) -> anyhow::Result<()> {
    if let Some(timeout) = &cli.timeout {
        SynthConfig::parse_duration(timeout)?;
        config.runner.timeout = timeout.clone();
    }
    if let Some(n) = cli.num_examples {
        config.runner.examples = n;
    }
    if let Some(seed) = cli.seed {
        config.runner.seed = Some(seed);
    }
    if let Some(max) = cli.max_string_length {
        config.runner.max_string_length = max;
    }
    if let Some(jobs) = cli.jobs {
        config.runner.jobs = Some(jobs);
    }
    if let Some(cc) = &cli.cc {
        config.toolchain.cc = cc.clone();
    }
    if let Some(dir) = &cli.build_dir {
        config.toolchain.build_dir = dir.display().to_string();
    }
    if cli.show_failures {
        config.output.show_failures = true;
    }
    Ok(())
}

fn build_executor(cli: &Cli, config: &SynthConfig) -> anyhow::Result<Executor> {
    let mut execution = ExecutionConfig::from_config(config)?;
    if cli.auto_fix {
        execution.load_policy = LoadPolicy::AutoFix;
    }
    Ok(Executor::new(execution, Toolchain::from_config(&config.toolchain)))
}

fn compile_filter(filter: &str) -> anyhow::Result<Regex> {
    Regex::new(filter).with_context(|| format!("invalid filter `{filter}`"))
}

fn run_references(
    cli: &Cli,
    config: &SynthConfig,
    format: OutputFormat,
    references: &Path,
    implementations: &Path,
    filter: &str,
) -> anyhow::Result<()> {
    let filter = compile_filter(filter)?;
    let plan = planner::build_plan(references, Some(implementations), Some(&filter))
        .with_context(|| format!("could not read references in {}", references.display()))?;

    if plan.references.is_empty() {
        println!("No references found.");
        return Ok(());
    }

    let executor = build_executor(cli, config)?;
    eprintln!(
        "Running {} references with {} candidates, {} examples each, {} job(s)...\n",
        plan.references.len(),
        plan.candidate_count(),
        executor.config().examples,
        executor.config().jobs
    );

    let start_time = Instant::now();
    let results = executor.execute(&plan);
    let total_duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;
    let report = build_report(results, executor.config(), config, total_duration_ms);

    emit_report(cli, config, format, &report)?;
    exit_on_errors(cli, &report);
    Ok(())
}

fn generate_examples(cli: &Cli, config: &SynthConfig, reference: &Path) -> anyhow::Result<()> {
    let executor = build_executor(cli, config)?;
    let prepared = executor.prepare(reference)?;
    let examples = executor.generate(&prepared)?;

    let path = match &cli.output {
        Some(path) => {
            write_examples(path, &prepared.reference.signature, &examples)?;
            path.clone()
        }
        None => executor.save_examples(&prepared.reference, &examples)?,
    };

    println!(
        "{}: generated {}/{} examples into {}",
        prepared.reference.name(),
        examples.len(),
        executor.config().examples,
        path.display()
    );
    if examples.is_empty() && cli.strict {
        std::process::exit(1);
    }
    Ok(())
}

fn evaluate_candidate(
    cli: &Cli,
    config: &SynthConfig,
    format: OutputFormat,
    reference: &Path,
    candidate: &Path,
    examples: Option<&Path>,
) -> anyhow::Result<()> {
    let start_time = Instant::now();
    let executor = build_executor(cli, config)?;
    let prepared = executor.prepare(reference)?;
    let name = prepared.reference.name().to_string();

    let examples_path = examples
        .map(Path::to_path_buf)
        .unwrap_or_else(|| executor.examples_path(&prepared.reference));
    let (line, examples) = read_examples(&examples_path)
        .with_context(|| format!("could not read examples for {name}"))?;
    if line != SignatureLine::from_signature(&prepared.reference.signature) {
        bail!(
            "{} does not describe the signature of {name}",
            examples_path.display()
        );
    }

    let (source, library) = executor
        .compile_candidates(&name, &[candidate.to_path_buf()])
        .into_iter()
        .next()
        .context("no candidate compiled")?;
    let report = executor.evaluate_candidate(&prepared, &source, library, &examples);

    let total_duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;
    let report = build_report(
        vec![ReferenceReport::evaluated(name, examples.len(), vec![report])],
        executor.config(),
        config,
        total_duration_ms,
    );
    emit_report(cli, config, format, &report)?;
    exit_on_errors(cli, &report);
    Ok(())
}

fn check_references(cli: &Cli, references: &Path, filter: &str) -> anyhow::Result<()> {
    let filter = compile_filter(filter)?;
    let plan = planner::build_plan(references, None, Some(&filter))
        .with_context(|| format!("could not read references in {}", references.display()))?;

    let mut blocked = 0;
    for planned in &plan.references {
        let reference = match FunctionReference::load(&planned.directory) {
            Ok(reference) => reference,
            Err(e) => {
                println!("{}: ERROR\n    {e}", planned.name);
                blocked += 1;
                continue;
            }
        };

        let issues = reference.issues();
        let usable = reference.validate(&issues).is_ok();
        if !usable {
            blocked += 1;
        }
        let status = match (issues.is_empty(), usable) {
            (true, _) => "OK",
            (false, true) => "OK (with warnings)",
            (false, false) => "NOT OK",
        };
        println!("{}: {status}", planned.name);
        for issue in &issues {
            let marker = if issue.is_ignorable() { "warning" } else { "error" };
            println!("    {marker}: {}", issue.message());
        }
    }

    println!(
        "\n{}/{} references usable.",
        plan.references.len() - blocked,
        plan.references.len()
    );
    if blocked > 0 && cli.strict {
        std::process::exit(1);
    }
    Ok(())
}

fn print_asm(cli: &Cli, config: &SynthConfig, reference: &Path) -> anyhow::Result<()> {
    let reference = FunctionReference::load(reference)?;
    let toolchain = Toolchain::from_config(&config.toolchain);
    let listing = toolchain.listing(&reference.source_path())?;
    let function = extract_function(&listing, reference.name()).with_context(|| {
        format!(
            "no function `{}` in the listing of {}",
            reference.name(),
            reference.source_path().display()
        )
    })?;
    write_output(cli.output.as_deref(), &function.standalone())
}

fn init_config() -> anyhow::Result<()> {
    let path = PathBuf::from(CONFIG_FILE);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    std::fs::write(&path, SynthConfig::default_toml())?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn emit_report(
    cli: &Cli,
    config: &SynthConfig,
    format: OutputFormat,
    report: &Report,
) -> anyhow::Result<()> {
    let output = match format {
        OutputFormat::Json => generate_json_report(report)?,
        OutputFormat::Csv => generate_csv_report(report),
        OutputFormat::Human => format_human_output(report, config.output.show_failures),
    };
    write_output(cli.output.as_deref(), &output)
}

fn write_output(path: Option<&Path>, output: &str) -> anyhow::Result<()> {
    if let Some(path) = path {
        let mut file = std::fs::File::create(path)?;
        file.write_all(output.as_bytes())?;
        println!("Report written to: {}", path.display());
    } else {
        print!("{}", output);
    }
    Ok(())
}

/// Exit with status 1 under `--strict` when a reference errored.
fn exit_on_errors(cli: &Cli, report: &Report) {
    if cli.strict && report.has_errors() {
        eprintln!(
            "\n{} reference(s) could not be evaluated",
            report.summary.errors
        );
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_flag_matches_cli() {
        let cli = Cli::try_parse_from(["synthbench", WORKER_FLAG]).unwrap();
        assert!(cli.synth_worker);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "synthbench",
            "run",
            "refs",
            "impls",
            "--filter",
            "^add",
            "-n",
            "10",
            "--strict",
        ])
        .unwrap();
        assert_eq!(cli.num_examples, Some(10));
        assert!(cli.strict);
        match cli.command {
            Some(Commands::Run {
                references,
                implementations,
                filter,
            }) => {
                assert_eq!(references, PathBuf::from("refs"));
                assert_eq!(implementations, PathBuf::from("impls"));
                assert_eq!(filter, "^add");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_evaluate_examples_file() {
        let cli = Cli::try_parse_from([
            "synthbench",
            "evaluate",
            "refs/add",
            "impls/add/add0.s",
            "--examples",
            "add.examples",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Evaluate { examples: Some(ref p), .. }) if p == Path::new("add.examples")
        ));
    }

    #[test]
    fn test_overrides_win_over_config() {
        let cli = Cli::try_parse_from([
            "synthbench",
            "generate",
            "refs/add",
            "--timeout",
            "250ms",
            "--seed",
            "9",
            "--cc",
            "clang",
        ])
        .unwrap();
        let mut config = SynthConfig::default();
        apply_overrides(&cli, &mut config).unwrap();
        assert_eq!(config.timeout(), std::time::Duration::from_millis(250));
        assert_eq!(config.runner.seed, Some(9));
        assert_eq!(config.toolchain.cc, "clang");
        assert_eq!(config.runner.examples, 50);
    }

    #[test]
    fn test_bad_timeout_rejected() {
        let cli = Cli::try_parse_from(["synthbench", "init", "--timeout", "soon"]).unwrap();
        assert!(apply_overrides(&cli, &mut SynthConfig::default()).is_err());
    }

    #[test]
    fn test_invalid_filter() {
        assert!(compile_filter("(").is_err());
        assert!(compile_filter("^add$").is_ok());
    }
}
