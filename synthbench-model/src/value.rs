//! Native Values and Bindings
//!
//! Values exchanged with foreign functions and stored in examples. Strings
//! hold one `char` per C byte (Latin-1), so arbitrary byte content survives
//! a trip through the example codec unchanged.

use std::fmt;

use fxhash::FxHashMap;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

use crate::ctype::{CType, Primitive};

/// A single scalar value
#[derive(Debug, Clone, Copy, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum Scalar {
    /// `int`
    Int(i32),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `char`
    Char(u8),
    /// `bool`
    Bool(bool),
}

impl Scalar {
    /// The primitive type of this scalar
    pub fn primitive(&self) -> Primitive {
        match self {
            Scalar::Int(_) => Primitive::Int,
            Scalar::Float(_) => Primitive::Float,
            Scalar::Double(_) => Primitive::Double,
            Scalar::Char(_) => Primitive::Char,
            Scalar::Bool(_) => Primitive::Bool,
        }
    }

    /// Equality used for judging candidates: NaN matches NaN
    pub fn matches(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Float(a), Scalar::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Scalar::Double(a), Scalar::Double(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }

    /// Integer view, if this is an `int`
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(i64::from(*i)),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Double(x) => write!(f, "{x}"),
            Scalar::Bool(true) => f.write_str("True"),
            Scalar::Bool(false) => f.write_str("False"),
            Scalar::Char(c) => {
                f.write_str("'")?;
                write_escaped(f, *c, b'\'')?;
                f.write_str("'")
            }
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, byte: u8, quote: u8) -> fmt::Result {
    match byte {
        b'\\' => f.write_str("\\\\"),
        b'\n' => f.write_str("\\n"),
        b'\t' => f.write_str("\\t"),
        b if b == quote => write!(f, "\\{}", b as char),
        0x20..=0x7e => write!(f, "{}", byte as char),
        _ => write!(f, "\\x{byte:02x}"),
    }
}

/// A value bound to a parameter or returned from a call
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum Value {
    /// Result of a `void` function
    Void,
    /// A scalar
    Scalar(Scalar),
    /// A non-char array
    Array(Vec<Scalar>),
    /// A `char *` string, one `char` per byte
    Str(String),
}

impl Value {
    /// Build a string value from raw C bytes
    pub fn string_from_bytes(bytes: &[u8]) -> Value {
        Value::Str(bytes.iter().map(|b| char::from(*b)).collect())
    }

    /// Raw C bytes of a string value (each `char` truncated to a byte)
    pub fn string_bytes(text: &str) -> Vec<u8> {
        text.chars().map(|c| u32::from(c) as u8).collect()
    }

    /// Compare an expected value against an actual one: NaN matches NaN,
    /// arrays compare element-wise
    pub fn matches(&self, actual: &Value) -> bool {
        match (self, actual) {
            (Value::Void, Value::Void) => true,
            (Value::Scalar(a), Value::Scalar(b)) => a.matches(b),
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.matches(y))
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }

    /// Length of an array or string
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Array(items) => Some(items.len()),
            Value::Str(text) => Some(text.chars().count()),
            _ => None,
        }
    }

    /// Integer view of an `int` scalar
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Scalar(s) => s.as_int(),
            _ => None,
        }
    }

    /// Whether this value can be bound to a parameter of type `ctype`
    pub fn conforms_to(&self, ctype: &CType) -> bool {
        match self {
            Value::Void => ctype.is_void(),
            Value::Scalar(s) => !ctype.is_pointer() && s.primitive() == ctype.primitive,
            Value::Str(_) => ctype.is_string(),
            Value::Array(items) => {
                ctype.pointer_level == 1
                    && ctype.primitive != Primitive::Char
                    && items.iter().all(|s| s.primitive() == ctype.primitive)
            }
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        Value::Scalar(scalar)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("_"),
            Value::Scalar(s) => write!(f, "{s}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Str(text) => {
                f.write_str("\"")?;
                for c in text.chars() {
                    write_escaped(f, u32::from(c) as u8, b'"')?;
                }
                f.write_str("\"")
            }
        }
    }
}

/// A named value, the wire form of one binding
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct NamedValue {
    /// Parameter name
    pub name: String,
    /// Bound value
    pub value: Value,
}

/// Parameter name to value mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: FxHashMap<String, Value>,
}

impl Bindings {
    /// Create empty bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Look up a value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Whether a name is bound
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over bindings in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Wire form, sorted by name
    pub fn to_named(&self) -> Vec<NamedValue> {
        let mut named: Vec<NamedValue> = self
            .values
            .iter()
            .map(|(name, value)| NamedValue {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        named.sort_by(|a, b| a.name.cmp(&b.name));
        named
    }

    /// Rebuild bindings from their wire form
    pub fn from_named(named: Vec<NamedValue>) -> Self {
        named.into_iter().map(|n| (n.name, n.value)).collect()
    }

    /// Whether every binding in `self` matches the same name in `actual`
    pub fn matches(&self, actual: &Bindings) -> bool {
        self.values.len() == actual.values.len()
            && self
                .values
                .iter()
                .all(|(name, expected)| actual.get(name).is_some_and(|a| expected.matches(a)))
    }
}

impl fmt::Display for Bindings {
    /// `{a: 1, b: [2, 3]}`, sorted by name
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, named) in self.to_named().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", named.name, named.value)?;
        }
        f.write_str("}")
    }
}

impl FromIterator<(String, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_matches_nan() {
        let nan = Value::Scalar(Scalar::Double(f64::NAN));
        assert!(nan.matches(&Value::Scalar(Scalar::Double(f64::NAN))));
        assert!(!nan.matches(&Value::Scalar(Scalar::Double(1.0))));
        let floats = Value::Array(vec![Scalar::Float(1.0), Scalar::Float(f32::NAN)]);
        assert!(floats.matches(&floats.clone()));
    }

    #[test]
    fn test_bindings_display_sorted() {
        let mut bindings = Bindings::new();
        bindings.insert("n", Value::Scalar(Scalar::Int(2)));
        bindings.insert("a", Value::Array(vec![Scalar::Int(1), Scalar::Int(2)]));
        assert_eq!(bindings.to_string(), "{a: [1, 2], n: 2}");
        assert_eq!(Bindings::new().to_string(), "{}");
    }

    #[test]
    fn test_array_length_mismatch() {
        let a = Value::Array(vec![Scalar::Int(1), Scalar::Int(2)]);
        let b = Value::Array(vec![Scalar::Int(1)]);
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_display_literals() {
        assert_eq!(Value::Void.to_string(), "_");
        assert_eq!(Value::Scalar(Scalar::Bool(true)).to_string(), "True");
        assert_eq!(Value::Scalar(Scalar::Char(b'\'')).to_string(), "'\\''");
        assert_eq!(Value::Str("a\"b".into()).to_string(), "\"a\\\"b\"");
        assert_eq!(
            Value::Array(vec![Scalar::Int(1), Scalar::Int(-2)]).to_string(),
            "[1, -2]"
        );
        assert_eq!(Value::Scalar(Scalar::Float(f32::NAN)).to_string(), "NaN");
        assert_eq!(Value::Scalar(Scalar::Double(f64::NEG_INFINITY)).to_string(), "-inf");
    }

    #[test]
    fn test_string_bytes_lossless() {
        let bytes = [0x41, 0xff, 0x07];
        let value = Value::string_from_bytes(&bytes);
        let Value::Str(text) = &value else {
            panic!("expected string");
        };
        assert_eq!(Value::string_bytes(text), bytes);
        assert_eq!(value.to_string(), "\"A\\xff\\x07\"");
    }

    #[test]
    fn test_conforms_to() {
        let int_ptr = CType::pointer(Primitive::Int);
        assert!(Value::Array(vec![Scalar::Int(3)]).conforms_to(&int_ptr));
        assert!(!Value::Array(vec![Scalar::Float(3.0)]).conforms_to(&int_ptr));
        assert!(Value::Str("x".into()).conforms_to(&CType::pointer(Primitive::Char)));
        assert!(!Value::Scalar(Scalar::Int(1)).conforms_to(&int_ptr));
    }

    #[test]
    fn test_named_roundtrip_sorted() {
        let mut bindings = Bindings::new();
        bindings.insert("n", Value::Scalar(Scalar::Int(2)));
        bindings.insert("a", Value::Array(vec![Scalar::Int(1)]));
        let named = bindings.to_named();
        assert_eq!(named[0].name, "a");
        assert_eq!(Bindings::from_named(named), bindings);
    }
}
