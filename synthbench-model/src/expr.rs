//! Expression Evaluation
//!
//! Constraint predicates and size expressions are written in a small
//! infix language (`and`, `or`, `not`, `True`, `False`, `//`,
//! single-quoted chars, `len(x)`). They are rewritten into evalexpr syntax and
//! evaluated against the current bindings. Nothing outside the bindings and
//! the fixed builtins is reachable.
//!
//! Integer division (`//` or `/`) truncates toward zero as in C, so
//! `-7 // 2` is `-3`. Sizes and bounds only divide non-negative values.

use std::sync::OnceLock;

use evalexpr::{
    ContextWithMutableFunctions, ContextWithMutableVariables, EvalexprError, Function,
    HashMapContext, Value as ExprValue, eval_with_context,
};
use regex::Regex;
use thiserror::Error;

use crate::value::{Bindings, Scalar, Value};

/// Errors from expression evaluation
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExprError {
    /// The expression referenced a name with no binding
    #[error("Unbound variable: {0}")]
    Unbound(String),

    /// evalexpr rejected or failed the expression
    #[error("Evaluation error in `{expression}`: {message}")]
    Eval {
        /// Expression as written
        expression: String,
        /// evalexpr's message
        message: String,
    },

    /// The expression produced a value of the wrong kind
    #[error("Expected {expected} from `{expression}`, got {got}")]
    Type {
        /// Expression as written
        expression: String,
        /// Kind of result expected
        expected: &'static str,
        /// What was produced
        got: String,
    },
}

/// Rewrite props-file expression syntax into evalexpr syntax.
///
/// String literals pass through untouched. Single-quoted literals become
/// double-quoted strings. `//` maps to evalexpr's truncating `/`.
pub fn translate(expression: &str) -> String {
    let chars: Vec<char> = expression.chars().collect();
    let mut out = String::with_capacity(expression.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                out.push('"');
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        out.push(chars[i]);
                        i += 1;
                    }
                    out.push(chars[i]);
                    i += 1;
                }
                if i < chars.len() {
                    out.push('"');
                    i += 1;
                }
            }
            '\'' => {
                out.push('"');
                i += 1;
                while i < chars.len() && chars[i] != '\'' {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        i += 1;
                        match chars[i] {
                            'n' => out.push('\n'),
                            't' => out.push('\t'),
                            '"' => out.push_str("\\\""),
                            '\\' => out.push_str("\\\\"),
                            other => out.push(other),
                        }
                    } else if chars[i] == '"' {
                        out.push_str("\\\"");
                    } else {
                        out.push(chars[i]);
                    }
                    i += 1;
                }
                out.push('"');
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                out.push('/');
                i += 2;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "and" => out.push_str("&&"),
                    "or" => out.push_str("||"),
                    "not" => out.push('!'),
                    "True" => out.push_str("true"),
                    "False" => out.push_str("false"),
                    _ => out.push_str(&word),
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Extract identifier names referenced by an expression, skipping builtins,
/// keywords and the contents of string literals
pub fn extract_variables(expression: &str) -> Vec<String> {
    static IDENT_RE: OnceLock<Regex> = OnceLock::new();
    static LITERAL_RE: OnceLock<Regex> = OnceLock::new();
    // Safety: these regex literals are guaranteed to compile
    let ident = IDENT_RE.get_or_init(|| Regex::new(r"\b([a-zA-Z_][a-zA-Z0-9_]*)\b").unwrap());
    let literal = LITERAL_RE
        .get_or_init(|| Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#).unwrap());

    let stripped = literal.replace_all(expression, " ");
    let mut names: Vec<String> = Vec::new();
    for capture in ident.captures_iter(&stripped) {
        let name = &capture[1];
        if !is_reserved(name) && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "and" | "or" | "not" | "True" | "False" | "true" | "false" | "len" | "min" | "max"
            | "abs" | "floor" | "ceil" | "round" | "if"
    )
}

fn to_expr_value(value: &Value) -> ExprValue {
    match value {
        Value::Void => ExprValue::Empty,
        Value::Scalar(s) => scalar_to_expr(s),
        Value::Array(items) => ExprValue::Tuple(items.iter().map(scalar_to_expr).collect()),
        Value::Str(text) => ExprValue::String(text.clone()),
    }
}

fn scalar_to_expr(scalar: &Scalar) -> ExprValue {
    match scalar {
        Scalar::Int(i) => ExprValue::Int(i64::from(*i)),
        Scalar::Float(x) => ExprValue::Float(f64::from(*x)),
        Scalar::Double(x) => ExprValue::Float(*x),
        Scalar::Char(c) => ExprValue::String(char::from(*c).to_string()),
        Scalar::Bool(b) => ExprValue::Boolean(*b),
    }
}

fn len_function() -> Function {
    Function::new(|argument| match argument {
        ExprValue::String(text) => Ok(ExprValue::Int(text.chars().count() as i64)),
        ExprValue::Tuple(items) => Ok(ExprValue::Int(items.len() as i64)),
        ExprValue::Empty => Ok(ExprValue::Int(0)),
        other => Err(EvalexprError::CustomMessage(format!(
            "len() of non-sequence {other}"
        ))),
    })
}

impl Bindings {
    fn expr_context(&self, expression: &str) -> Result<HashMapContext, ExprError> {
        let eval_error = |e: EvalexprError| ExprError::Eval {
            expression: expression.to_string(),
            message: e.to_string(),
        };
        let mut ctx = HashMapContext::new();
        for (name, value) in self.iter() {
            ctx.set_value(name.clone(), to_expr_value(value))
                .map_err(eval_error)?;
        }
        ctx.set_function("len".to_string(), len_function())
            .map_err(eval_error)?;
        Ok(ctx)
    }

    /// Evaluate an expression against these bindings
    pub fn evaluate(&self, expression: &str) -> Result<ExprValue, ExprError> {
        let ctx = self.expr_context(expression)?;
        eval_with_context(&translate(expression), &ctx).map_err(|e| match e {
            EvalexprError::VariableIdentifierNotFound(name) => ExprError::Unbound(name),
            other => ExprError::Eval {
                expression: expression.to_string(),
                message: other.to_string(),
            },
        })
    }

    /// Evaluate a predicate
    pub fn evaluate_bool(&self, expression: &str) -> Result<bool, ExprError> {
        match self.evaluate(expression)? {
            ExprValue::Boolean(b) => Ok(b),
            ExprValue::Int(i) => Ok(i != 0),
            other => Err(ExprError::Type {
                expression: expression.to_string(),
                expected: "boolean",
                got: format!("{other:?}"),
            }),
        }
    }

    /// Evaluate an integer-valued expression (sizes)
    pub fn evaluate_int(&self, expression: &str) -> Result<i64, ExprError> {
        match self.evaluate(expression)? {
            ExprValue::Int(i) => Ok(i),
            ExprValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(f as i64),
            other => Err(ExprError::Type {
                expression: expression.to_string(),
                expected: "integer",
                got: format!("{other:?}"),
            }),
        }
    }

    /// Evaluate a numeric expression (constraint bounds)
    pub fn evaluate_number(&self, expression: &str) -> Result<f64, ExprError> {
        match self.evaluate(expression)? {
            ExprValue::Int(i) => Ok(i as f64),
            ExprValue::Float(f) => Ok(f),
            other => Err(ExprError::Type {
                expression: expression.to_string(),
                expected: "number",
                got: format!("{other:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings() -> Bindings {
        let mut b = Bindings::new();
        b.insert("n", Value::Scalar(Scalar::Int(4)));
        b.insert("x", Value::Scalar(Scalar::Double(2.5)));
        b.insert("s", Value::Str("hello".into()));
        b.insert("a", Value::Array(vec![Scalar::Int(1), Scalar::Int(2)]));
        b.insert("c", Value::Scalar(Scalar::Char(b'q')));
        b
    }

    #[test]
    fn test_translate_keywords() {
        assert_eq!(translate("n > 0 and not x"), "n > 0 && ! x");
        assert_eq!(translate("a or True"), "a || true");
        assert_eq!(translate("n // 2"), "n / 2");
        assert_eq!(translate("c == 'a'"), "c == \"a\"");
        assert_eq!(translate("s == \"and\""), "s == \"and\"");
    }

    #[test]
    fn test_basic_evaluation() {
        let b = bindings();
        assert_eq!(b.evaluate_int("n * 2 + 1").unwrap(), 9);
        assert_eq!(b.evaluate_int("n // 3").unwrap(), 1);
        assert!(b.evaluate_bool("x < n and n > 0").unwrap());
        assert!((b.evaluate_number("x * 2").unwrap() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_integer_division_truncates() {
        let b = bindings();
        assert_eq!(b.evaluate_int("7 // 2").unwrap(), 3);
        assert_eq!(b.evaluate_int("-7 // 2").unwrap(), -3);
        assert_eq!(b.evaluate_int("(0 - n) // 3").unwrap(), -1);
    }

    #[test]
    fn test_len_builtin() {
        let b = bindings();
        assert_eq!(b.evaluate_int("len(s)").unwrap(), 5);
        assert_eq!(b.evaluate_int("len(s) + 1").unwrap(), 6);
        assert!(b.evaluate_bool("len(a) == 2").unwrap());
    }

    #[test]
    fn test_char_comparison() {
        let b = bindings();
        assert!(b.evaluate_bool("c == 'q'").unwrap());
        assert!(b.evaluate_bool("c != 'z'").unwrap());
    }

    #[test]
    fn test_unbound_variable() {
        let b = bindings();
        assert!(matches!(b.evaluate_bool("m > 0"), Err(ExprError::Unbound(name)) if name == "m"));
    }

    #[test]
    fn test_extract_variables() {
        let vars = extract_variables("len(s) > n and c != 'x' and not flag");
        assert_eq!(vars, vec!["s", "n", "c", "flag"]);
    }
}
