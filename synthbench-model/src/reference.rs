//! Reference Loader
//!
//! A reference is a directory holding `props` (the prototype plus `output`,
//! `size` and `constraint` directives) and `ref.c` (the reference
//! implementation).

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::ctype::Primitive;
use crate::error::ParseError;
use crate::signature::{
    Comparison, Constraint, FunctionSignature, GlobalConstraint, ParamConstraint, SizeSpec,
};
use crate::validate::{ParseIssue, signature_issues};

/// What to do with a reference that has blocking issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Refuse to load it
    #[default]
    Strict,
    /// Drop the offending declarations once and check again
    AutoFix,
}

/// A parsed reference directory
#[derive(Debug, Clone)]
pub struct FunctionReference {
    /// Directory the reference was loaded from
    pub directory: PathBuf,
    /// Annotated signature from `props`
    pub signature: FunctionSignature,
    /// `#include` lines of `ref.c`
    pub includes: Vec<String>,
    /// Function source from `ref.c`, starting at its prototype
    pub code: String,
    unknown_names: Vec<String>,
}

impl FunctionReference {
    /// Read `props` and `ref.c` from `directory`
    pub fn load(directory: impl AsRef<Path>) -> Result<Self, ParseError> {
        let directory = directory.as_ref();
        let props_path = directory.join("props");
        let ref_path = directory.join("ref.c");
        let props = fs::read_to_string(&props_path).map_err(|e| ParseError::io(&props_path, e))?;
        let reference = fs::read_to_string(&ref_path).map_err(|e| ParseError::io(&ref_path, e))?;
        Self::parse(directory, &props, &reference, &props_path.display().to_string())
    }

    /// Build a reference from file contents
    pub fn parse(
        directory: impl Into<PathBuf>,
        props: &str,
        reference: &str,
        props_name: &str,
    ) -> Result<Self, ParseError> {
        let mut lines = props.lines().enumerate();
        let (_, prototype) = lines.next().ok_or_else(|| ParseError::Props {
            path: props_name.to_string(),
            line: 1,
            message: "missing prototype".to_string(),
        })?;
        let mut signature = FunctionSignature::parse_prototype(prototype)?;
        let mut unknown_names = Vec::new();

        for (index, raw) in lines {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let props_error = |message: String| ParseError::Props {
                path: props_name.to_string(),
                line: index + 1,
                message,
            };

            if let Some(name) = directive(line, "output") {
                let name = name.trim();
                match signature.parameter_mut(name) {
                    Some(param) => param.is_output = true,
                    None => unknown_names.push(name.to_string()),
                }
            } else if let Some(rest) = directive(line, "size") {
                let (array, size) = parse_size(rest).map_err(props_error)?;
                match signature.parameter_mut(&array) {
                    Some(param) => param.size = Some(size),
                    None => unknown_names.push(array),
                }
            } else if let Some(rest) =
                directive(line, "constraint").or_else(|| directive(line, "constrain"))
            {
                let constraint = parse_constraint(rest, &signature).map_err(props_error)?;
                signature.add_constraint(constraint)?;
            } else {
                return Err(props_error(format!("invalid directive `{line}`")));
            }
        }

        let (includes, code) = split_reference(reference);

        Ok(Self {
            directory: directory.into(),
            signature,
            includes,
            code,
            unknown_names,
        })
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.signature.name
    }

    /// Path of the reference implementation
    pub fn source_path(&self) -> PathBuf {
        self.directory.join("ref.c")
    }

    /// Every issue found in this reference
    pub fn issues(&self) -> BTreeSet<ParseIssue> {
        let mut issues = signature_issues(&self.signature);
        if !self.unknown_names.is_empty() {
            issues.insert(ParseIssue::UnknownParameter);
        }

        let prototype = self.code.find('{').map(|end| &self.code[..end]);
        let matches = prototype
            .and_then(|p| FunctionSignature::parse_prototype(p).ok())
            .is_some_and(|r| r.prototype_matches(&self.signature));
        if !matches {
            issues.insert(ParseIssue::ReferenceSignatureMismatch);
        }

        issues
    }

    /// Fail if any issue blocks using the reference
    pub fn validate(&self, issues: &BTreeSet<ParseIssue>) -> Result<(), ParseError> {
        let blocking: Vec<ParseIssue> = issues.iter().filter(|i| !i.is_ignorable()).copied().collect();
        if blocking.is_empty() {
            Ok(())
        } else {
            Err(ParseError::Issues {
                name: self.name().to_string(),
                issues: blocking,
            })
        }
    }

    /// Drop declarations that produce fixable issues
    fn auto_fix(&mut self) {
        let int_scalars: Vec<String> = self
            .signature
            .parameters
            .iter()
            .filter(|p| !p.ctype.is_pointer() && p.ctype.primitive == Primitive::Int)
            .map(|p| p.name.clone())
            .collect();

        for param in &mut self.signature.parameters {
            if param.is_output && !param.ctype.is_pointer() {
                param.is_output = false;
            }
            if !param.ctype.is_pointer() {
                param.size = None;
            }
            if let Some(SizeSpec::Var { var }) = &param.size {
                if !int_scalars.contains(var) {
                    param.size = None;
                }
            }
            if param.is_array() {
                param.constraints.retain(|c| c.op.is_equality());
            }
        }
        self.unknown_names.clear();
    }
}

/// Load a reference, logging its issues and applying `policy`
pub fn load_reference(
    directory: impl AsRef<Path>,
    policy: LoadPolicy,
) -> Result<FunctionReference, ParseError> {
    let mut reference = FunctionReference::load(directory)?;
    let mut issues = reference.issues();

    if !issues.is_empty() {
        warn!(
            reference = reference.name(),
            issues = ?issues,
            "Reference has issues"
        );
    }

    if policy == LoadPolicy::AutoFix && reference.validate(&issues).is_err() {
        reference.auto_fix();
        issues = reference.issues();
        info!(
            reference = reference.name(),
            remaining = ?issues,
            "Applied automatic fixes"
        );
    }

    reference.validate(&issues)?;
    reference.signature.validate()?;
    Ok(reference)
}

/// Parse `arr, spec` from a `size` directive
fn parse_size(rest: &str) -> Result<(String, SizeSpec), String> {
    let rest = rest.trim().trim_start_matches(',').trim();
    let (array, spec) = rest
        .split_once(',')
        .ok_or_else(|| format!("size directive needs `array, size`: `{rest}`"))?;
    let array = array.trim().to_string();
    let spec = spec.trim();

    if spec.starts_with('{') {
        return Ok((array, SizeSpec::SimpleExpr { expr: braced(spec)? }));
    }

    if let Some((init, expr)) = spec.split_once(',') {
        let init = init
            .trim()
            .parse()
            .map_err(|_| format!("invalid initial size `{}`", init.trim()))?;
        let expr = braced(expr.trim())?;
        return Ok((array, SizeSpec::Expr { init, expr }));
    }

    if let Ok(size) = spec.parse() {
        return Ok((array, SizeSpec::Const { size }));
    }

    if spec.is_empty() {
        return Err(format!("missing size for `{array}`"));
    }
    Ok((array, SizeSpec::Var { var: spec.to_string() }))
}

fn braced(text: &str) -> Result<String, String> {
    let inner = text
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or_else(|| format!("expected `{{ expr }}`, got `{text}`"))?
        .trim();
    if inner.is_empty() {
        return Err("empty size expression".to_string());
    }
    Ok(inner.to_string())
}

/// Body of `line` when it starts with the `keyword` directive
fn directive<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}

/// Whether a constraint's right-hand side is a single operand
///
/// Anything with a logical connective or a further comparison is kept as a
/// whole predicate instead.
fn is_simple_operand(value: &str) -> bool {
    static LITERAL_RE: OnceLock<Regex> = OnceLock::new();
    static COMPOUND_RE: OnceLock<Regex> = OnceLock::new();
    // Safety: these regex literals are guaranteed to compile
    let literal = LITERAL_RE
        .get_or_init(|| Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#).unwrap());
    let compound =
        COMPOUND_RE.get_or_init(|| Regex::new(r"\b(?:and|or|not)\b|[<>=!]|&&|\|\|").unwrap());

    let bare = literal.replace_all(value, "\"\"");
    !compound.is_match(&bare)
}

/// Parse the body of a `constraint` directive
fn parse_constraint(rest: &str, signature: &FunctionSignature) -> Result<Constraint, String> {
    static PARAM_RE: OnceLock<Regex> = OnceLock::new();
    // Safety: this regex literal is guaranteed to compile
    let re = PARAM_RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*(<=|>=|==|!=|<|>)\s*(.+)$").unwrap()
    });

    let rest = rest.trim();
    if rest.is_empty() {
        return Err("empty constraint".to_string());
    }
    if rest.starts_with('{') {
        return Ok(Constraint::Global(GlobalConstraint {
            predicate: braced(rest)?,
        }));
    }

    if let Some(captures) = re.captures(rest) {
        let var = &captures[1];
        let value = captures[3].trim();
        if let (Some(_), Some(op)) = (signature.parameter(var), Comparison::parse(&captures[2])) {
            if is_simple_operand(value) {
                return Ok(Constraint::Param(ParamConstraint {
                    var: var.to_string(),
                    op,
                    value: value.to_string(),
                }));
            }
        }
    }

    Ok(Constraint::Global(GlobalConstraint {
        predicate: rest.to_string(),
    }))
}

/// Split `ref.c` into its includes and the function source
fn split_reference(source: &str) -> (Vec<String>, String) {
    static FUNC_RE: OnceLock<Regex> = OnceLock::new();
    // Safety: this regex literal is guaranteed to compile
    let re = FUNC_RE.get_or_init(|| Regex::new(r"^(int|float|double|char|bool|_Bool|void)\b").unwrap());

    let mut includes = Vec::new();
    let lines: Vec<&str> = source.lines().collect();
    for (index, line) in lines.iter().enumerate() {
        let line = line.trim_start();
        if re.is_match(line) {
            let mut code = lines[index..].join("\n");
            code.push('\n');
            return (includes, code);
        }
        if line.starts_with("#include") {
            includes.push(line.trim_end().to_string());
        }
    }
    (includes, String::new())
}
