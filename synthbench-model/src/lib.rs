#![warn(missing_docs)]
//! Synthbench Model - Typed C Signatures and Examples
//!
//! The data model shared by every other synthbench crate:
//! - C types restricted to scalars and single-level pointers
//! - Parameters with output flags, size relationships and value constraints
//! - Native values and name bindings, with the NaN-aware equality policy
//! - A sandboxed expression evaluator for constraint and size expressions
//! - The plain-text example codec
//! - The `props` + `ref.c` reference loader and its issue checks

mod codec;
mod ctype;
mod error;
mod expr;
mod graph;
mod reference;
mod signature;
mod validate;
mod value;

pub use codec::{
    ExampleInstance, LineParsers, SignatureLine, ValueParser, form_examples, parse_examples,
    read_examples, write_examples,
};
pub use ctype::{CType, Primitive};
pub use error::{ModelError, ParseError};
pub use expr::{ExprError, extract_variables, translate};
pub use graph::{DependencyGraph, GraphError};
pub use reference::{FunctionReference, LoadPolicy, load_reference};
pub use signature::{
    Bounds, Comparison, Constraint, FunctionSignature, GlobalConstraint, ParamConstraint,
    Parameter, SizeSpec,
};
pub use validate::{ParseIssue, signature_issues};
pub use value::{Bindings, NamedValue, Scalar, Value};
