//! Example Codec
//!
//! Plain-text persistence for a batch of examples. The first line declares
//! the shape, every following line is one example:
//!
//! ```text
//! (int *a, int n) int ()
//! ([1, 2, 3], 3) 6 ()
//! ([], 0) 0 ()
//! ```
//!
//! Strings are double quoted, chars single quoted, a `void` return is `_`,
//! arrays are bracketed. Instance lines that do not parse are dropped.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::ctype::{CType, Primitive};
use crate::error::{ModelError, ParseError};
use crate::signature::{FunctionSignature, parse_declaration};
use crate::value::{Bindings, Scalar, Value};

/// One realized trial: inputs plus the reference's observed results
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleInstance {
    /// Generated inputs
    pub inputs: Bindings,
    /// Expected return value
    pub return_value: Value,
    /// Expected output parameter values
    pub outputs: Bindings,
}

impl ExampleInstance {
    /// Format this example against a signature line
    pub fn form(&self, line: &SignatureLine) -> Result<String, ModelError> {
        let inputs = form_group(&self.inputs, &line.inputs)?;
        let outputs = form_group(&self.outputs, &line.outputs)?;
        let value = if line.return_type.is_void() {
            Value::Void.to_string()
        } else {
            self.return_value.to_string()
        };
        Ok(format!("({inputs}) {value} ({outputs})"))
    }

    /// Parse one instance line, `None` if any part fails
    pub fn parse(parsers: &LineParsers, text: &str) -> Option<Self> {
        let (inputs, rest) = parse_group(text, &parsers.inputs)?;
        let (return_value, rest) = parsers.return_value.parse(rest)?;
        let (outputs, rest) = parse_group(rest, &parsers.outputs)?;
        if !rest.trim().is_empty() {
            return None;
        }
        Some(Self {
            inputs,
            return_value,
            outputs,
        })
    }
}

fn form_group(values: &Bindings, declared: &[(String, CType)]) -> Result<String, ModelError> {
    let mut parts = Vec::with_capacity(declared.len());
    for (name, _) in declared {
        let value = values
            .get(name)
            .ok_or_else(|| ModelError::Unbound(name.clone()))?;
        parts.push(value.to_string());
    }
    Ok(parts.join(", "))
}

fn parse_group<'a>(text: &'a str, parsers: &[(String, ValueParser)]) -> Option<(Bindings, &'a str)> {
    let mut rest = text.trim_start().strip_prefix('(')?;
    let mut values = Bindings::new();
    for (name, parser) in parsers {
        let (value, after) = parser.parse(rest)?;
        values.insert(name.clone(), value);
        rest = after.trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest);
    }
    let rest = rest.trim_start().strip_prefix(')')?;
    Some((values, rest))
}

/// The declaration line of an example file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureLine {
    /// Every parameter in declared order
    pub inputs: Vec<(String, CType)>,
    /// Return type
    pub return_type: CType,
    /// Output parameters in declared order
    pub outputs: Vec<(String, CType)>,
}

impl SignatureLine {
    /// The line describing examples of `signature`
    pub fn from_signature(signature: &FunctionSignature) -> Self {
        Self {
            inputs: signature
                .parameters
                .iter()
                .map(|p| (p.name.clone(), p.ctype))
                .collect(),
            return_type: signature.return_type,
            outputs: signature
                .outputs()
                .map(|p| (p.name.clone(), p.ctype))
                .collect(),
        }
    }

    /// Parse `(decls) type (decls)`
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let malformed = || ParseError::Examples(format!("bad signature line `{}`", line.trim()));
        let line = line.trim();
        let inputs_end = line.find(')').ok_or_else(malformed)? + 1;
        let outputs_start = line.rfind('(').ok_or_else(malformed)?;
        if inputs_end > outputs_start || !line.starts_with('(') || !line.ends_with(')') {
            return Err(malformed());
        }

        let declarations = |group: &str| -> Result<Vec<(String, CType)>, ParseError> {
            group
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|d| parse_declaration(d).map(|(t, n)| (n, t)).ok_or_else(malformed))
                .collect()
        };

        Ok(Self {
            inputs: declarations(&line[1..inputs_end - 1])?,
            return_type: CType::parse(&line[inputs_end..outputs_start])?,
            outputs: declarations(&line[outputs_start + 1..line.len() - 1])?,
        })
    }

    /// Select one parser per declared value
    pub fn parsers(&self) -> Result<LineParsers, ModelError> {
        let group = |decls: &[(String, CType)]| -> Result<Vec<(String, ValueParser)>, ModelError> {
            decls
                .iter()
                .map(|(name, ctype)| Ok((name.clone(), ValueParser::for_type(ctype)?)))
                .collect()
        };
        Ok(LineParsers {
            inputs: group(&self.inputs)?,
            return_value: ValueParser::for_type(&self.return_type)?,
            outputs: group(&self.outputs)?,
        })
    }
}

impl fmt::Display for SignatureLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = |decls: &[(String, CType)]| -> String {
            decls
                .iter()
                .map(|(name, ctype)| {
                    if ctype.is_pointer() {
                        format!("{ctype}{name}")
                    } else {
                        format!("{ctype} {name}")
                    }
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(
            f,
            "({}) {} ({})",
            group(&self.inputs),
            self.return_type,
            group(&self.outputs)
        )
    }
}

/// Parsers chosen once from a signature line
#[derive(Debug, Clone)]
pub struct LineParsers {
    inputs: Vec<(String, ValueParser)>,
    return_value: ValueParser,
    outputs: Vec<(String, ValueParser)>,
}

/// Literal parser for one declared type
#[derive(Debug, Clone, PartialEq)]
pub enum ValueParser {
    /// `_`
    Void,
    /// Integer literal
    Int,
    /// `float` literal
    Float,
    /// `double` literal
    Double,
    /// `'c'`
    Char,
    /// `True` / `False`
    Bool,
    /// `"..."`
    Str,
    /// `[a, b, ...]`
    List(Box<ValueParser>),
}

impl ValueParser {
    /// Parser for values of `ctype`
    pub fn for_type(ctype: &CType) -> Result<Self, ModelError> {
        ctype.ensure_supported()?;
        let scalar = match ctype.primitive {
            Primitive::Void => return Ok(ValueParser::Void),
            Primitive::Char if ctype.is_pointer() => return Ok(ValueParser::Str),
            Primitive::Int => ValueParser::Int,
            Primitive::Float => ValueParser::Float,
            Primitive::Double => ValueParser::Double,
            Primitive::Char => ValueParser::Char,
            Primitive::Bool => ValueParser::Bool,
        };
        if ctype.is_pointer() {
            Ok(ValueParser::List(Box::new(scalar)))
        } else {
            Ok(scalar)
        }
    }

    /// Parse one value from the front of `text`, returning the remainder
    pub fn parse<'a>(&self, text: &'a str) -> Option<(Value, &'a str)> {
        match self {
            ValueParser::Void => {
                let rest = text.trim_start().strip_prefix('_')?;
                Some((Value::Void, rest))
            }
            ValueParser::Str => {
                let (body, rest) = token(string_re(), text)?;
                Some((Value::string_from_bytes(&unescape(body)?), rest))
            }
            ValueParser::List(element) => {
                let mut rest = text.trim_start().strip_prefix('[')?;
                let mut items = Vec::new();
                while let Some((item, after)) = element.parse_scalar(rest) {
                    items.push(item);
                    rest = after.trim_start();
                    match rest.strip_prefix(',') {
                        Some(after_sep) => rest = after_sep,
                        None => break,
                    }
                }
                let rest = rest.trim_start().strip_prefix(']')?;
                Some((Value::Array(items), rest))
            }
            _ => {
                let (scalar, rest) = self.parse_scalar(text)?;
                Some((Value::Scalar(scalar), rest))
            }
        }
    }

    fn parse_scalar<'a>(&self, text: &'a str) -> Option<(Scalar, &'a str)> {
        match self {
            ValueParser::Int => {
                let (digits, rest) = token(int_re(), text)?;
                Some((Scalar::Int(digits.parse().ok()?), rest))
            }
            ValueParser::Float => {
                let (number, rest) = token(real_re(), text)?;
                Some((Scalar::Float(number.parse().ok()?), rest))
            }
            ValueParser::Double => {
                let (number, rest) = token(real_re(), text)?;
                Some((Scalar::Double(number.parse().ok()?), rest))
            }
            ValueParser::Bool => {
                let (word, rest) = token(bool_re(), text)?;
                Some((Scalar::Bool(word == "True"), rest))
            }
            ValueParser::Char => {
                let (body, rest) = token(char_re(), text)?;
                match unescape(body)?.as_slice() {
                    [byte] => Some((Scalar::Char(*byte), rest)),
                    _ => None,
                }
            }
            ValueParser::Void | ValueParser::Str | ValueParser::List(_) => None,
        }
    }
}

fn token<'a>(re: &Regex, text: &'a str) -> Option<(&'a str, &'a str)> {
    let captures = re.captures(text)?;
    let whole = captures.get(0)?;
    let body = captures.get(1)?;
    Some((body.as_str(), &text[whole.end()..]))
}

// Safety: the regex literals below are guaranteed to compile

fn int_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(-?\d+)").unwrap())
}

fn real_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(-?(?:NaN|inf|\d+(?:\.\d+)?(?:[eE][-+]?\d+)?))").unwrap()
    })
}

fn bool_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(True|False)").unwrap())
}

fn char_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*'(\\x[0-9a-fA-F]{2}|\\.|[^\\'])'").unwrap())
}

fn string_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*"((?:[^\\"]|\\.)*)""#).unwrap())
}

fn unescape(body: &str) -> Option<Vec<u8>> {
    let mut bytes = Vec::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            bytes.push(u8::try_from(u32::from(c)).ok()?);
            continue;
        }
        match chars.next()? {
            'n' => bytes.push(b'\n'),
            't' => bytes.push(b'\t'),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                bytes.push(u8::from_str_radix(&hex, 16).ok()?);
            }
            other => bytes.push(u8::try_from(u32::from(other)).ok()?),
        }
    }
    Some(bytes)
}

/// Format a batch as file lines: the signature line, then one line per example
pub fn form_examples(
    signature: &FunctionSignature,
    examples: &[ExampleInstance],
) -> Result<Vec<String>, ModelError> {
    let line = SignatureLine::from_signature(signature);
    let mut lines = Vec::with_capacity(examples.len() + 1);
    lines.push(line.to_string());
    for example in examples {
        lines.push(example.form(&line)?);
    }
    Ok(lines)
}

/// Parse a signature line and its instance lines, dropping malformed instances
pub fn parse_examples<'a>(
    signature_line: &str,
    lines: impl IntoIterator<Item = &'a str>,
) -> Result<(SignatureLine, Vec<ExampleInstance>), ParseError> {
    let line = SignatureLine::parse(signature_line)?;
    let parsers = line.parsers()?;
    let examples = lines
        .into_iter()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| ExampleInstance::parse(&parsers, l))
        .collect();
    Ok((line, examples))
}

/// Write a batch to `path`
pub fn write_examples(
    path: impl AsRef<Path>,
    signature: &FunctionSignature,
    examples: &[ExampleInstance],
) -> Result<(), ParseError> {
    let path = path.as_ref();
    let mut text = form_examples(signature, examples)?.join("\n");
    text.push('\n');
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ParseError::io(parent, e))?;
    }
    fs::write(path, text).map_err(|e| ParseError::io(path, e))
}

/// Read a batch from `path`
pub fn read_examples(
    path: impl AsRef<Path>,
) -> Result<(SignatureLine, Vec<ExampleInstance>), ParseError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
    let mut lines = text.lines();
    let first = lines
        .next()
        .ok_or_else(|| ParseError::Examples(format!("{} is empty", path.display())))?;
    parse_examples(first, lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{Parameter, SizeSpec};

    fn copy_signature() -> FunctionSignature {
        FunctionSignature::new(
            "shout",
            CType::VOID,
            vec![
                Parameter::new("a", CType::scalar(Primitive::Int)),
                Parameter::new("b", CType::scalar(Primitive::Float)),
                Parameter::new("s", CType::pointer(Primitive::Char))
                    .output()
                    .sized(SizeSpec::Const { size: 10 }),
            ],
        )
    }

    #[test]
    fn test_signature_line_format() {
        let line = SignatureLine::from_signature(&copy_signature());
        assert_eq!(line.to_string(), "(int a, float b, char *s) void (char *s)");
        assert_eq!(SignatureLine::parse(&line.to_string()).unwrap(), line);
    }

    #[test]
    fn test_parse_documented_file() {
        let (_, examples) = parse_examples(
            "(int a, float b, char *s) void (char *s)",
            [
                r#"(1, 1.5, "a string") _ (" a new string")"#,
                r#"(-4, 10.001, "a string with \" escaped characters") _ ("less chars")"#,
            ],
        )
        .unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].inputs.get("a"), Some(&Value::Scalar(Scalar::Int(1))));
        assert_eq!(
            examples[1].inputs.get("s"),
            Some(&Value::Str("a string with \" escaped characters".into()))
        );
        assert_eq!(examples[0].return_value, Value::Void);
        assert_eq!(examples[1].outputs.get("s"), Some(&Value::Str("less chars".into())));
    }

    #[test]
    fn test_array_line_reformats_identically() {
        let header = "(int *a, int *b, int n) int ()";
        let text = "([1, 2, 3], [4, 5, 6], 3) -1 ()";
        let (line, examples) = parse_examples(header, [text]).unwrap();
        assert_eq!(examples.len(), 1);

        let ints = |xs: &[i32]| Value::Array(xs.iter().copied().map(Scalar::Int).collect());
        let example = &examples[0];
        assert_eq!(example.inputs.get("a"), Some(&ints(&[1, 2, 3])));
        assert_eq!(example.inputs.get("b"), Some(&ints(&[4, 5, 6])));
        assert_eq!(example.inputs.get("n"), Some(&Value::Scalar(Scalar::Int(3))));
        assert_eq!(example.return_value, Value::Scalar(Scalar::Int(-1)));
        assert!(example.outputs.is_empty());

        assert_eq!(line.to_string(), header);
        assert_eq!(example.form(&line).unwrap(), text);
    }

    #[test]
    fn test_mixed_shapes_round_trip() {
        let sig = FunctionSignature::new(
            "fill",
            CType::VOID,
            vec![
                Parameter::new("xs", CType::pointer(Primitive::Float))
                    .output()
                    .sized(SizeSpec::Var { var: "n".into() }),
                Parameter::new("ds", CType::pointer(Primitive::Double))
                    .sized(SizeSpec::Const { size: 2 }),
                Parameter::new("c", CType::scalar(Primitive::Char)),
                Parameter::new("n", CType::scalar(Primitive::Int)),
                Parameter::new("s", CType::pointer(Primitive::Char))
                    .output()
                    .sized(SizeSpec::Const { size: 8 }),
            ],
        );
        let floats = |xs: &[f32]| Value::Array(xs.iter().copied().map(Scalar::Float).collect());

        let mut inputs = Bindings::new();
        inputs.insert("xs", floats(&[1.5, -0.25, 3.0]));
        inputs.insert(
            "ds",
            Value::Array(vec![Scalar::Double(2.5), Scalar::Double(-1e-3)]),
        );
        inputs.insert("c", Value::Scalar(Scalar::Char(b'q')));
        inputs.insert("n", Value::Scalar(Scalar::Int(3)));
        inputs.insert("s", Value::Str("in put".into()));
        let mut outputs = Bindings::new();
        outputs.insert("xs", floats(&[3.0, -0.5, 6.0]));
        outputs.insert("s", Value::Str("OUT \"x\"".into()));
        let example = ExampleInstance {
            inputs,
            return_value: Value::Void,
            outputs,
        };

        let lines = form_examples(&sig, std::slice::from_ref(&example)).unwrap();
        assert_eq!(
            lines[0],
            "(float *xs, double *ds, char c, int n, char *s) void (float *xs, char *s)"
        );
        assert!(lines[1].contains(") _ ("));

        let (line, parsed) =
            parse_examples(&lines[0], lines[1..].iter().map(String::as_str)).unwrap();
        assert_eq!(parsed, vec![example]);
        assert_eq!(parsed[0].form(&line).unwrap(), lines[1]);
    }

    #[test]
    fn test_malformed_lines_dropped() {
        let (_, examples) = parse_examples(
            "(int *a, int n) int ()",
            [
                "([1, 2, 3], 3) 6 ()",
                "([1, 2, 3], 3) 6",
                "([1, oops], 2) 1 ()",
                "",
                "([], 0) 0 ()",
            ],
        )
        .unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[1].inputs.get("a"), Some(&Value::Array(vec![])));
    }

    #[test]
    fn test_nan_and_escapes_survive_format() {
        let sig = FunctionSignature::new(
            "f",
            CType::scalar(Primitive::Double),
            vec![
                Parameter::new("c", CType::scalar(Primitive::Char)),
                Parameter::new("ok", CType::scalar(Primitive::Bool)),
                Parameter::new("s", CType::pointer(Primitive::Char)),
            ],
        );
        let mut inputs = Bindings::new();
        inputs.insert("c", Value::Scalar(Scalar::Char(b'\'')));
        inputs.insert("ok", Value::Scalar(Scalar::Bool(false)));
        inputs.insert("s", Value::string_from_bytes(b"tab\there \\ \x01"));
        let example = ExampleInstance {
            inputs,
            return_value: Value::Scalar(Scalar::Double(f64::NAN)),
            outputs: Bindings::new(),
        };

        let lines = form_examples(&sig, std::slice::from_ref(&example)).unwrap();
        let (_, parsed) = parse_examples(&lines[0], lines[1..].iter().map(String::as_str)).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].inputs, example.inputs);
        assert!(parsed[0].return_value.matches(&example.return_value));
        assert_eq!(parsed[0].form(&SignatureLine::from_signature(&sig)).unwrap(), lines[1]);
    }

    #[test]
    fn test_file_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("examples");
        let sig = FunctionSignature::new(
            "id",
            CType::scalar(Primitive::Int),
            vec![Parameter::new("x", CType::scalar(Primitive::Int))],
        );
        let examples: Vec<ExampleInstance> = (0..5)
            .map(|i| {
                let mut inputs = Bindings::new();
                inputs.insert("x", Value::Scalar(Scalar::Int(i)));
                ExampleInstance {
                    inputs,
                    return_value: Value::Scalar(Scalar::Int(i)),
                    outputs: Bindings::new(),
                }
            })
            .collect();

        write_examples(&path, &sig, &examples).unwrap();
        let (line, read) = read_examples(&path).unwrap();
        assert_eq!(line, SignatureLine::from_signature(&sig));
        assert_eq!(read, examples);
    }

    #[test]
    fn test_unsupported_parser() {
        assert!(ValueParser::for_type(&CType::parse("int **").unwrap()).is_err());
        assert_eq!(
            ValueParser::for_type(&CType::pointer(Primitive::Double)).unwrap(),
            ValueParser::List(Box::new(ValueParser::Double))
        );
    }
}
