//! C Types
//!
//! The supported subset: five scalar primitives plus `void`, each optionally
//! behind a single level of pointer.

use std::fmt;

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

use crate::error::ModelError;

/// A C primitive type
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Archive, RkyvSerialize, RkyvDeserialize,
)]
#[archive(check_bytes)]
pub enum Primitive {
    /// 32-bit signed `int`
    Int,
    /// 32-bit `float`
    Float,
    /// 64-bit `double`
    Double,
    /// 8-bit `char`
    Char,
    /// `bool` / `_Bool`
    Bool,
    /// `void`, only meaningful as a return type
    Void,
}

impl Primitive {
    /// Parse a C primitive type name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Primitive::Int),
            "float" => Some(Primitive::Float),
            "double" => Some(Primitive::Double),
            "char" => Some(Primitive::Char),
            "bool" | "_Bool" => Some(Primitive::Bool),
            "void" => Some(Primitive::Void),
            _ => None,
        }
    }

    /// The C spelling of this primitive
    pub fn as_str(&self) -> &'static str {
        match self {
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Char => "char",
            Primitive::Bool => "bool",
            Primitive::Void => "void",
        }
    }

    /// Whether values of this primitive are integers for bound rounding
    pub fn is_integral(&self) -> bool {
        matches!(self, Primitive::Int)
    }

    /// Whether values of this primitive are floating point
    pub fn is_floating(&self) -> bool {
        matches!(self, Primitive::Float | Primitive::Double)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A C type: primitive plus pointer depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct CType {
    /// Base primitive
    pub primitive: Primitive,
    /// Number of `*` levels
    pub pointer_level: u8,
}

impl CType {
    /// A scalar (non-pointer) type
    pub const fn scalar(primitive: Primitive) -> Self {
        Self {
            primitive,
            pointer_level: 0,
        }
    }

    /// A single-level pointer type
    pub const fn pointer(primitive: Primitive) -> Self {
        Self {
            primitive,
            pointer_level: 1,
        }
    }

    /// The `void` type
    pub const VOID: CType = CType::scalar(Primitive::Void);

    /// Parse `int`, `char *`, `double*` and similar spellings.
    ///
    /// Any pointer depth is accepted here; see [`CType::ensure_supported`].
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        let text = text.trim();
        let pointer_level = text.chars().filter(|c| *c == '*').count();
        let base = text.trim_end_matches(|c: char| c == '*' || c.is_whitespace());
        if base.contains('*') {
            return Err(ModelError::UnsupportedType(text.to_string()));
        }
        let base = base.trim_start_matches("const ").trim();
        let primitive =
            Primitive::parse(base).ok_or_else(|| ModelError::UnsupportedType(text.to_string()))?;
        let pointer_level = u8::try_from(pointer_level)
            .map_err(|_| ModelError::UnsupportedType(text.to_string()))?;
        Ok(Self {
            primitive,
            pointer_level,
        })
    }

    /// Whether this is a pointer type
    pub fn is_pointer(&self) -> bool {
        self.pointer_level > 0
    }

    /// Whether this is `void`
    pub fn is_void(&self) -> bool {
        self.primitive == Primitive::Void && self.pointer_level == 0
    }

    /// Whether this is `char *`
    pub fn is_string(&self) -> bool {
        self.primitive == Primitive::Char && self.pointer_level == 1
    }

    /// Reject multi-level pointers and `void *`
    pub fn ensure_supported(&self) -> Result<(), ModelError> {
        if self.pointer_level > 1 || (self.primitive == Primitive::Void && self.is_pointer()) {
            return Err(ModelError::UnsupportedType(self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.primitive.as_str())?;
        if self.pointer_level > 0 {
            f.write_str(" ")?;
            for _ in 0..self.pointer_level {
                f.write_str("*")?;
            }
        }
        Ok(())
    }
}
