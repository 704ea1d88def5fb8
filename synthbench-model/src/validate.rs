//! Signature Issue Checks

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::ctype::Primitive;
use crate::graph::DependencyGraph;
use crate::signature::{FunctionSignature, SizeSpec};

/// Problems found in a parsed reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParseIssue {
    /// Return type is a pointer
    ArrayReturnType,
    /// A parameter is a pointer to pointer
    MultiLevelPointer,
    /// An output parameter is not a pointer
    ScalarOutputParameter,
    /// A size was given to a scalar
    ScalarGivenSize,
    /// A size variable is missing or not an `int`
    GivenInvalidSize,
    /// A non-string array has no size
    UnsizedArrayParameter,
    /// `ref.c` and `props` disagree on the prototype
    ReferenceSignatureMismatch,
    /// A name is not a C identifier
    InvalidIdentifierName,
    /// A directive names a parameter that does not exist
    UnknownParameter,
    /// An array or string uses an ordering comparison
    ArrayConstraintOperator,
    /// Array sizes depend on each other in a cycle
    SizeDependencyCycle,
    /// A size expression reads an array generated after it
    UnorderedSizeDependency,
}

impl ParseIssue {
    /// Human readable description
    pub fn message(&self) -> &'static str {
        match self {
            ParseIssue::ArrayReturnType => "Return type must be `void' or scalar",
            ParseIssue::MultiLevelPointer => "Multi-level pointers are not supported",
            ParseIssue::ScalarOutputParameter => "Output parameters must be pointers",
            ParseIssue::ScalarGivenSize => "Only array parameters can be given a size",
            ParseIssue::GivenInvalidSize => "Sizes must be a valid type",
            ParseIssue::UnsizedArrayParameter => "All unterminated arrays must be given a size",
            ParseIssue::ReferenceSignatureMismatch => "The signatures in `ref.c' and `props' differ",
            ParseIssue::InvalidIdentifierName => "All names must be valid C identifiers",
            ParseIssue::UnknownParameter => "Directives must name declared parameters",
            ParseIssue::ArrayConstraintOperator => "Arrays may only be constrained with == or !=",
            ParseIssue::SizeDependencyCycle => "Array sizes must not depend on each other cyclically",
            ParseIssue::UnorderedSizeDependency => {
                "Array sizes may only read parameters generated before them"
            }
        }
    }

    /// Issues that do not block using the reference
    pub fn is_ignorable(&self) -> bool {
        matches!(self, ParseIssue::ScalarGivenSize)
    }
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

fn is_identifier(name: &str) -> bool {
    static IDENT_RE: OnceLock<Regex> = OnceLock::new();
    // Safety: this regex literal is guaranteed to compile
    let re = IDENT_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
    re.is_match(name)
}

/// Check a signature and its annotations for every issue that does not need
/// the reference source
pub fn signature_issues(signature: &FunctionSignature) -> BTreeSet<ParseIssue> {
    let mut issues = BTreeSet::new();

    if signature.return_type.is_pointer() {
        issues.insert(ParseIssue::ArrayReturnType);
    }
    if signature.return_type.pointer_level > 1 {
        issues.insert(ParseIssue::MultiLevelPointer);
    }

    let mut graph = DependencyGraph::new();
    let order: Vec<&str> = signature.safe_order().map(|p| p.name.as_str()).collect();

    for param in &signature.parameters {
        graph.add_node(param.name.clone());

        if param.ctype.pointer_level > 1 {
            issues.insert(ParseIssue::MultiLevelPointer);
        }
        if !is_identifier(&param.name) {
            issues.insert(ParseIssue::InvalidIdentifierName);
        }
        if param.is_output && !param.ctype.is_pointer() {
            issues.insert(ParseIssue::ScalarOutputParameter);
        }
        if param.is_array()
            && param
                .constraints
                .iter()
                .any(|c| !c.op.is_equality())
        {
            issues.insert(ParseIssue::ArrayConstraintOperator);
        }

        let Some(size) = &param.size else {
            if param.is_array() && param.ctype.primitive != Primitive::Char {
                issues.insert(ParseIssue::UnsizedArrayParameter);
            }
            continue;
        };

        if !param.ctype.is_pointer() {
            issues.insert(ParseIssue::ScalarGivenSize);
        }

        if let SizeSpec::Var { var } = size {
            let valid = signature
                .parameter(var)
                .is_some_and(|p| !p.ctype.is_pointer() && p.ctype.primitive == Primitive::Int);
            if !valid {
                issues.insert(ParseIssue::GivenInvalidSize);
            }
        }

        let position = order.iter().position(|n| *n == param.name);
        for dep in size.dependencies() {
            let Some(target) = signature.parameter(&dep) else {
                issues.insert(ParseIssue::UnknownParameter);
                continue;
            };
            graph.add_dependency(param.name.clone(), dep.clone());

            let reads_later = order.iter().position(|n| *n == dep) >= position;
            if target.is_array() && reads_later && !matches!(size, SizeSpec::Expr { .. }) {
                issues.insert(ParseIssue::UnorderedSizeDependency);
            }
        }
    }

    if graph.topological_sort().is_err() {
        issues.insert(ParseIssue::SizeDependencyCycle);
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctype::CType;
    use crate::signature::{Comparison, Parameter};

    fn int() -> CType {
        CType::scalar(Primitive::Int)
    }

    fn int_ptr() -> CType {
        CType::pointer(Primitive::Int)
    }

    #[test]
    fn test_clean_signature() {
        let sig = FunctionSignature::new(
            "sum",
            int(),
            vec![
                Parameter::new("a", int_ptr()).sized(SizeSpec::Var { var: "n".into() }),
                Parameter::new("n", int()),
            ],
        );
        assert!(signature_issues(&sig).is_empty());
    }

    #[test]
    fn test_unsized_and_scalar_output() {
        let sig = FunctionSignature::new(
            "f",
            int_ptr(),
            vec![
                Parameter::new("a", int_ptr()),
                Parameter::new("x", int()).output(),
                Parameter::new("s", CType::pointer(Primitive::Char)),
            ],
        );
        let issues = signature_issues(&sig);
        assert!(issues.contains(&ParseIssue::ArrayReturnType));
        assert!(issues.contains(&ParseIssue::UnsizedArrayParameter));
        assert!(issues.contains(&ParseIssue::ScalarOutputParameter));
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn test_invalid_size_variable() {
        let sig = FunctionSignature::new(
            "f",
            CType::VOID,
            vec![
                Parameter::new("a", int_ptr()).sized(SizeSpec::Var { var: "x".into() }),
                Parameter::new("x", CType::scalar(Primitive::Float)),
            ],
        );
        assert!(signature_issues(&sig).contains(&ParseIssue::GivenInvalidSize));
    }

    #[test]
    fn test_size_cycle() {
        let sig = FunctionSignature::new(
            "f",
            CType::VOID,
            vec![
                Parameter::new("a", int_ptr()).sized(SizeSpec::SimpleExpr {
                    expr: "len(b)".into(),
                }),
                Parameter::new("b", int_ptr()).sized(SizeSpec::SimpleExpr {
                    expr: "len(a)".into(),
                }),
            ],
        );
        let issues = signature_issues(&sig);
        assert!(issues.contains(&ParseIssue::SizeDependencyCycle));
        assert!(issues.contains(&ParseIssue::UnorderedSizeDependency));
    }

    #[test]
    fn test_output_string_expr_size_reads_input() {
        let sig = FunctionSignature::new(
            "copy",
            CType::VOID,
            vec![
                Parameter::new("dst", CType::pointer(Primitive::Char))
                    .output()
                    .sized(SizeSpec::Expr {
                        init: 0,
                        expr: "len(src) + 1".into(),
                    }),
                Parameter::new("src", CType::pointer(Primitive::Char)),
            ],
        );
        assert!(signature_issues(&sig).is_empty());
    }

    #[test]
    fn test_array_ordering_constraint() {
        let sig = FunctionSignature::new(
            "f",
            CType::VOID,
            vec![Parameter::new("s", CType::pointer(Primitive::Char)).constrained(Comparison::Lt, "\"b\"")],
        );
        assert!(signature_issues(&sig).contains(&ParseIssue::ArrayConstraintOperator));
        assert!(!ParseIssue::ArrayConstraintOperator.is_ignorable());
        assert!(ParseIssue::ScalarGivenSize.is_ignorable());
    }
}
