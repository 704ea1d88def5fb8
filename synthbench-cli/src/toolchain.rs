//! C Toolchain Wrapper
//!
//! Turns reference and candidate sources (C or GAS assembly) into shared
//! libraries the worker can `dlopen`, and measures the compiled `.text`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ToolchainConfig;

/// A source file could not be turned into a shared library
#[derive(Debug, Error)]
#[error("Cannot compile {source_path} into {library}: {stderr}")]
pub struct CompilationError {
    /// Source being compiled
    pub source_path: String,
    /// Library that should have been produced
    pub library: String,
    /// Compiler diagnostics, or the spawn failure
    pub stderr: String,
}

/// Compiler driver and section size tool
#[derive(Debug, Clone)]
pub struct Toolchain {
    cc: String,
    cflags: Vec<String>,
    size: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::from_config(&ToolchainConfig::default())
    }
}

impl Toolchain {
    /// Toolchain described by the `[toolchain]` config section
    pub fn from_config(config: &ToolchainConfig) -> Self {
        Self {
            cc: config.cc.clone(),
            cflags: config.cflags.clone(),
            size: config.size.clone(),
        }
    }

    /// Compiler driver
    pub fn cc(&self) -> &str {
        &self.cc
    }

    /// Compile `source` into the shared library `library`
    pub fn compile(&self, source: &Path, library: &Path) -> Result<(), CompilationError> {
        let error = |stderr: String| CompilationError {
            source_path: source.display().to_string(),
            library: library.display().to_string(),
            stderr,
        };

        if let Some(parent) = library.parent() {
            fs::create_dir_all(parent).map_err(|e| error(e.to_string()))?;
        }

        debug!(
            source = %source.display(),
            library = %library.display(),
            cc = %self.cc,
            "Compiling"
        );

        let output = Command::new(&self.cc)
            .args(["-shared", "-fPIC"])
            .args(&self.cflags)
            .arg("-o")
            .arg(library)
            .arg(source)
            .output()
            .map_err(|e| error(format!("failed to run `{}`: {e}", self.cc)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(error(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }

    /// Compile a candidate, patching in a `.globl` directive if needed.
    ///
    /// Assembly that fails to build, or that never exports `function`, is
    /// rewritten into `scratch` with the symbol made global and compiled once
    /// more.
    pub fn compile_candidate(
        &self,
        source: &Path,
        library: &Path,
        function: &str,
        scratch: &Path,
    ) -> Result<(), CompilationError> {
        if !is_assembly(source) {
            return self.compile(source, library);
        }

        let text = fs::read_to_string(source).map_err(|e| CompilationError {
            source_path: source.display().to_string(),
            library: library.display().to_string(),
            stderr: e.to_string(),
        })?;

        let first = self.compile(source, library);
        if first.is_ok() && declares_global(&text, function) {
            return first;
        }

        let Some(patched) = ensure_globl(&text) else {
            return first;
        };
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "candidate.s".to_string());
        let patched_path = scratch.join(file_name);
        fs::create_dir_all(scratch)
            .and_then(|_| fs::write(&patched_path, patched))
            .map_err(|e| CompilationError {
                source_path: patched_path.display().to_string(),
                library: library.display().to_string(),
                stderr: e.to_string(),
            })?;

        info!(
            source = %source.display(),
            patched = %patched_path.display(),
            "Retrying with an exported symbol"
        );
        self.compile(&patched_path, library)
    }

    /// GAS listing of a C source, as produced by `cc -S`
    pub fn listing(&self, source: &Path) -> Result<String, CompilationError> {
        let error = |stderr: String| CompilationError {
            source_path: source.display().to_string(),
            library: "-".to_string(),
            stderr,
        };
        let output = Command::new(&self.cc)
            .arg("-S")
            .args(&self.cflags)
            .args(["-o", "-"])
            .arg(source)
            .output()
            .map_err(|e| error(format!("failed to run `{}`: {e}", self.cc)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(error(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }

    /// `.text` size of a compiled library, `None` when `size` is unavailable
    pub fn text_size(&self, library: &Path) -> Option<u64> {
        let output = Command::new(&self.size).arg(library).output().ok()?;
        if !output.status.success() {
            return None;
        }
        parse_size_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Whether `path` holds GAS assembly
pub fn is_assembly(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("s") | Some("S")
    )
}

/// Library path for a compiled source: `<dir>/<stem>.so`
pub fn library_path(dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(format!("{stem}.so"))
}

fn declares_global(asm: &str, function: &str) -> bool {
    asm.lines().any(|line| {
        let mut words = line.split_whitespace();
        matches!(words.next(), Some(".globl") | Some(".global"))
            && words.next().is_some_and(|w| w.trim_end_matches(',') == function)
    })
}

/// Prepend `.globl` for the first label in the listing.
///
/// Returns `None` when no label is found.
pub fn ensure_globl(asm: &str) -> Option<String> {
    static LABEL_RE: OnceLock<Regex> = OnceLock::new();
    // Safety: this regex literal is guaranteed to compile
    let re = LABEL_RE.get_or_init(|| Regex::new(r"(?m)^\s*([A-Za-z_][A-Za-z0-9_]*):").unwrap());

    let label = re.captures(asm)?.get(1)?.as_str();
    Some(format!(".globl {label}\n{asm}"))
}

/// Pull the text column out of `size` (Berkeley format) output
fn parse_size_output(output: &str) -> Option<u64> {
    let mut lines = output.lines();
    let header = lines.next()?;
    if header.split_whitespace().next()? != "text" {
        return None;
    }
    lines.next()?.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_globl_uses_first_label() {
        let asm = "\t.text\nadd:\n\tlea eax, [rdi+rsi]\n\tret\n";
        let patched = ensure_globl(asm).unwrap();
        assert!(patched.starts_with(".globl add\n"));
        assert!(patched.ends_with(asm));
        assert_eq!(ensure_globl("\tret\n"), None);
    }

    #[test]
    fn test_declares_global() {
        assert!(declares_global("\t.globl\tadd\nadd:\n", "add"));
        assert!(declares_global(".global add\n", "add"));
        assert!(!declares_global(".globl adder\n", "add"));
        assert!(!declares_global("add:\n\tret\n", "add"));
    }

    #[test]
    fn test_parse_size_output() {
        let out = "   text\t   data\t    bss\t    dec\t    hex\tfilename\n   1234\t    552\t      8\t   1794\t    702\tlib.so\n";
        assert_eq!(parse_size_output(out), Some(1234));
        assert_eq!(parse_size_output("garbage\n1 2 3\n"), None);
        assert_eq!(parse_size_output(""), None);
    }

    #[test]
    fn test_library_path_and_kind() {
        let lib = library_path(Path::new("build/add"), Path::new("impls/add/add3.s"));
        assert_eq!(lib, PathBuf::from("build/add/add3.so"));
        assert!(is_assembly(Path::new("x.S")));
        assert!(!is_assembly(Path::new("x.c")));
    }

    #[test]
    fn test_missing_compiler_is_compilation_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("f.c");
        fs::write(&source, "int f(void) { return 0; }\n").unwrap();
        let toolchain = Toolchain {
            cc: "/nonexistent/cc".to_string(),
            cflags: vec![],
            size: "size".to_string(),
        };
        let err = toolchain
            .compile(&source, &dir.path().join("f.so"))
            .unwrap_err();
        assert!(err.stderr.contains("failed to run"));
        assert!(err.source_path.ends_with("f.c"));
    }
}
