//! Function Signatures
//!
//! Parameters, array size relationships and value constraints for a single
//! C function. A signature is built once by the reference loader and shared
//! read-only by generation, execution and evaluation.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

use crate::ctype::{CType, Primitive};
use crate::error::{ModelError, ParseError};
use crate::expr::{ExprError, extract_variables};
use crate::value::{Bindings, Scalar, Value};

/// How the length of an array parameter is determined
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum SizeSpec {
    /// Length is the current value of an `int` parameter
    Var {
        /// Name of the size parameter
        var: String,
    },
    /// Fixed length; an upper bound for strings
    Const {
        /// Length
        size: usize,
    },
    /// `init` bounds the generated value, `expr` sizes the foreign buffer
    Expr {
        /// Bound on the initial native length
        init: usize,
        /// Foreign buffer size expression
        expr: String,
    },
    /// Length is always `expr`
    SimpleExpr {
        /// Size expression
        expr: String,
    },
}

impl SizeSpec {
    /// Resolve the size of `array` against the current bindings.
    ///
    /// With `initial` set this is the length for generating a fresh native
    /// value. Otherwise it is the foreign buffer length, and `native_len`
    /// (the bound value's length) must fit in it.
    pub fn evaluate(
        &self,
        array: &str,
        bindings: &Bindings,
        initial: bool,
        native_len: Option<usize>,
    ) -> Result<usize, ModelError> {
        let size = match self {
            SizeSpec::Var { var } => {
                let value = bindings
                    .get(var)
                    .ok_or_else(|| ModelError::Unbound(var.clone()))?;
                let n = value.as_int().ok_or_else(|| ModelError::InvalidSize {
                    array: array.to_string(),
                    message: format!("`{var}` is not an int"),
                })?;
                to_size(array, n)?
            }
            SizeSpec::Const { size } => *size,
            SizeSpec::Expr { init, .. } if initial => return Ok(*init),
            SizeSpec::Expr { expr, .. } | SizeSpec::SimpleExpr { expr } => {
                let n = bindings.evaluate_int(expr).map_err(|e| match e {
                    ExprError::Unbound(name) => ModelError::Unbound(name),
                    other => ModelError::Expr(other),
                })?;
                to_size(array, n)?
            }
        };

        if let Some(len) = native_len.filter(|_| !initial) {
            if len > size && !matches!(self, SizeSpec::Var { .. }) {
                return Err(ModelError::InvalidSize {
                    array: array.to_string(),
                    message: format!("buffer of {size} cannot hold value of length {len}"),
                });
            }
        }

        Ok(size)
    }

    /// Parameter names this size reads
    pub fn dependencies(&self) -> Vec<String> {
        match self {
            SizeSpec::Var { var } => vec![var.clone()],
            SizeSpec::Const { .. } => Vec::new(),
            SizeSpec::Expr { expr, .. } | SizeSpec::SimpleExpr { expr } => extract_variables(expr),
        }
    }
}

fn to_size(array: &str, n: i64) -> Result<usize, ModelError> {
    usize::try_from(n).map_err(|_| ModelError::InvalidSize {
        array: array.to_string(),
        message: format!("negative size {n}"),
    })
}

impl fmt::Display for SizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeSpec::Var { var } => write!(f, "{var}"),
            SizeSpec::Const { size } => write!(f, "{size}"),
            SizeSpec::Expr { init, expr } => write!(f, "{init}, {{ {expr} }}"),
            SizeSpec::SimpleExpr { expr } => write!(f, "{{ {expr} }}"),
        }
    }
}

/// Comparison operator of a [`ParamConstraint`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum Comparison {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl Comparison {
    /// Parse an operator token
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "<" => Some(Comparison::Lt),
            "<=" => Some(Comparison::Le),
            ">" => Some(Comparison::Gt),
            ">=" => Some(Comparison::Ge),
            "==" => Some(Comparison::Eq),
            "!=" => Some(Comparison::Ne),
            _ => None,
        }
    }

    /// Operator token
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }

    /// Whether the operator may be used on array and string parameters
    pub fn is_equality(&self) -> bool {
        matches!(self, Comparison::Eq | Comparison::Ne)
    }

    /// Apply the operator to two values
    pub fn compare<T: PartialOrd>(&self, lhs: &T, rhs: &T) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Eq => lhs == rhs,
            Comparison::Ne => lhs != rhs,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Restriction on a single parameter: `var op value`
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct ParamConstraint {
    /// Constrained parameter
    pub var: String,
    /// Operator
    pub op: Comparison,
    /// Right-hand side expression
    pub value: String,
}

impl ParamConstraint {
    /// The constraint as a boolean expression
    pub fn predicate(&self) -> String {
        format!("{} {} ({})", self.var, self.op, self.value)
    }

    /// Whether the constraint holds for the bound value of `var`.
    ///
    /// A `float` value is compared at single precision, with the right-hand
    /// side rounded to `f32` first.
    pub fn holds(&self, bindings: &Bindings) -> Result<bool, ExprError> {
        if let Some(Value::Scalar(Scalar::Float(x))) = bindings.get(&self.var) {
            let rhs = bindings.evaluate_number(&self.value)? as f32;
            return Ok(self.op.compare(x, &rhs));
        }
        bindings.evaluate_bool(&self.predicate())
    }
}

/// Arbitrary predicate over the whole input binding
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct GlobalConstraint {
    /// Boolean expression
    pub predicate: String,
}

/// Either kind of constraint, as read from a `props` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Attached to one parameter
    Param(ParamConstraint),
    /// Checked over the full binding
    Global(GlobalConstraint),
}

/// Effective numeric range of a scalar parameter
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    /// Largest lower bound seen
    pub min: Option<f64>,
    /// Smallest upper bound seen
    pub max: Option<f64>,
}

impl Bounds {
    fn raise_min(&mut self, v: f64) {
        self.min = Some(self.min.map_or(v, |m| m.max(v)));
    }

    fn lower_max(&mut self, v: f64) {
        self.max = Some(self.max.map_or(v, |m| m.min(v)));
    }
}

/// One parameter of a C function
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct Parameter {
    /// Identifier
    pub name: String,
    /// Declared type
    pub ctype: CType,
    /// Whether the callee writes through this pointer
    pub is_output: bool,
    /// Array length relationship
    pub size: Option<SizeSpec>,
    /// Attached constraints in declaration order
    pub constraints: Vec<ParamConstraint>,
}

impl Parameter {
    /// A plain input parameter
    pub fn new(name: impl Into<String>, ctype: CType) -> Self {
        Self {
            name: name.into(),
            ctype,
            is_output: false,
            size: None,
            constraints: Vec::new(),
        }
    }

    /// Mark as output
    pub fn output(mut self) -> Self {
        self.is_output = true;
        self
    }

    /// Attach a size
    pub fn sized(mut self, size: SizeSpec) -> Self {
        self.size = Some(size);
        self
    }

    /// Attach a constraint on this parameter
    pub fn constrained(mut self, op: Comparison, value: impl Into<String>) -> Self {
        self.constraints.push(ParamConstraint {
            var: self.name.clone(),
            op,
            value: value.into(),
        });
        self
    }

    /// Whether this is a (single-level) pointer parameter
    pub fn is_array(&self) -> bool {
        self.ctype.pointer_level == 1
    }

    /// Whether this is a `char *` string
    pub fn is_string(&self) -> bool {
        self.ctype.is_string()
    }

    /// Effective range from the ordering constraints.
    ///
    /// Integer bounds are rounded inwards (`n < 5` gives max 4). A bound whose
    /// right-hand side references a parameter not yet bound is skipped; the
    /// post-generation check still enforces it.
    pub fn bounds(&self, bindings: &Bindings) -> Result<Bounds, ModelError> {
        let mut bounds = Bounds::default();
        if !self.ctype.primitive.is_integral() && !self.ctype.primitive.is_floating() {
            return Ok(bounds);
        }
        let integral = self.ctype.primitive.is_integral();

        for constraint in &self.constraints {
            if constraint.op == Comparison::Ne {
                continue;
            }
            let v = match bindings.evaluate_number(&constraint.value) {
                Ok(v) => v,
                Err(ExprError::Unbound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            match (constraint.op, integral) {
                (Comparison::Lt, true) => bounds.lower_max(v.ceil() - 1.0),
                (Comparison::Le, true) => bounds.lower_max(v.floor()),
                (Comparison::Gt, true) => bounds.raise_min(v.floor() + 1.0),
                (Comparison::Ge, true) => bounds.raise_min(v.ceil()),
                (Comparison::Lt | Comparison::Le, false) => bounds.lower_max(v),
                (Comparison::Gt | Comparison::Ge, false) => bounds.raise_min(v),
                (Comparison::Eq, _) => {
                    bounds.raise_min(if integral { v.ceil() } else { v });
                    bounds.lower_max(if integral { v.floor() } else { v });
                }
                (Comparison::Ne, _) => {}
            }
        }

        if self.ctype.primitive == Primitive::Float {
            bounds.min = bounds.min.map(|v| f64::from(v as f32));
            bounds.max = bounds.max.map(|v| f64::from(v as f32));
        }

        if let (Some(min), Some(max)) = (bounds.min, bounds.max) {
            if min > max {
                return Err(ModelError::Constraint {
                    name: self.name.clone(),
                    min,
                    max,
                });
            }
        }
        Ok(bounds)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctype.is_pointer() {
            write!(f, "{}{}", self.ctype, self.name)
        } else {
            write!(f, "{} {}", self.ctype, self.name)
        }
    }
}

/// A C function's full signature with its annotations
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct FunctionSignature {
    /// Symbol name
    pub name: String,
    /// Return type
    pub return_type: CType,
    /// Parameters in declared order
    pub parameters: Vec<Parameter>,
    /// Predicates over the full binding
    pub constraints: Vec<GlobalConstraint>,
}

impl FunctionSignature {
    /// Build a signature with no global constraints
    pub fn new(name: impl Into<String>, return_type: CType, parameters: Vec<Parameter>) -> Self {
        Self {
            name: name.into(),
            return_type,
            parameters,
            constraints: Vec::new(),
        }
    }

    /// Parse a C prototype such as `int sum(int *a, int n)`
    pub fn parse_prototype(prototype: &str) -> Result<Self, ParseError> {
        static PROTO_RE: OnceLock<Regex> = OnceLock::new();
        // Safety: this regex literal is guaranteed to compile
        let re = PROTO_RE.get_or_init(|| Regex::new(r"(?s)^(.*?)\((.*)\)").unwrap());

        let invalid = || ParseError::Prototype(prototype.trim().to_string());
        let captures = re.captures(prototype.trim()).ok_or_else(invalid)?;
        let (return_type, name) = parse_declaration(&captures[1]).ok_or_else(invalid)?;

        let params = captures[2].trim();
        let mut parameters = Vec::new();
        if !params.is_empty() && params != "void" {
            for param in params.split(',') {
                let (ctype, name) = parse_declaration(param).ok_or_else(invalid)?;
                parameters.push(Parameter::new(name, ctype));
            }
        }

        Ok(Self::new(name, return_type, parameters))
    }

    /// Look up a parameter by name
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Look up a parameter by name for modification
    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.name == name)
    }

    /// Add a constraint, attaching parameter constraints to their parameter
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<(), ModelError> {
        match constraint {
            Constraint::Param(c) => {
                let param = self
                    .parameter_mut(&c.var)
                    .ok_or_else(|| ModelError::UnknownParameter(c.var.clone()))?;
                param.constraints.push(c);
            }
            Constraint::Global(c) => self.constraints.push(c),
        }
        Ok(())
    }

    /// Generation order: scalars, then arrays, each in declared order
    pub fn safe_order(&self) -> impl Iterator<Item = &Parameter> {
        let scalars = self.parameters.iter().filter(|p| !p.is_array());
        let arrays = self.parameters.iter().filter(|p| p.is_array());
        scalars.chain(arrays)
    }

    /// Output parameters in declared order
    pub fn outputs(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(|p| p.is_output)
    }

    /// Whether every parameter and global constraint holds
    pub fn satisfied(&self, bindings: &Bindings) -> Result<bool, ExprError> {
        for param in &self.parameters {
            for constraint in &param.constraints {
                if !constraint.holds(bindings)? {
                    return Ok(false);
                }
            }
        }
        for constraint in &self.constraints {
            if !bindings.evaluate_bool(&constraint.predicate)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Structural equality of name, return type and parameter declarations
    pub fn prototype_matches(&self, other: &FunctionSignature) -> bool {
        self.name == other.name
            && self.return_type == other.return_type
            && self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .zip(&other.parameters)
                .all(|(a, b)| a.name == b.name && a.ctype == b.ctype)
    }

    /// Reject anything the execution bridge cannot call
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.return_type.is_pointer() {
            return Err(ModelError::UnsupportedType(format!(
                "pointer return type {}",
                self.return_type
            )));
        }
        for param in &self.parameters {
            param.ctype.ensure_supported()?;
            if param.ctype.primitive == Primitive::Void {
                return Err(ModelError::UnsupportedType(format!(
                    "void parameter {}",
                    param.name
                )));
            }
            if param.is_output && !param.is_array() {
                return Err(ModelError::UnsupportedType(format!(
                    "scalar output parameter {}",
                    param.name
                )));
            }
        }
        Ok(())
    }

    /// The C prototype, e.g. `int sum(int *a, int n)`
    pub fn c_prototype(&self) -> String {
        let params: Vec<String> = self.parameters.iter().map(|p| p.to_string()).collect();
        let sep = if self.return_type.is_pointer() { "" } else { " " };
        format!("{}{sep}{}({})", self.return_type, self.name, params.join(", "))
    }
}

/// Split `type name` into its parts
pub(crate) fn parse_declaration(decl: &str) -> Option<(CType, String)> {
    static DECL_RE: OnceLock<Regex> = OnceLock::new();
    // Safety: this regex literal is guaranteed to compile
    let re = DECL_RE.get_or_init(|| {
        Regex::new(r"^\s*((?:const\s+)?(?:int|char|float|double|bool|_Bool|void)[\s*]+)(\S.*?)\s*$")
            .unwrap()
    });
    let captures = re.captures(decl)?;
    let ctype = CType::parse(&captures[1]).ok()?;
    Some((ctype, captures[2].to_string()))
}
