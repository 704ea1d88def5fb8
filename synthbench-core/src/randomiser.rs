//! Random Value Source
//!
//! Uniform scalars inside constraint bounds, printable strings and arrays.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use synthbench_model::{Bounds, Primitive, Scalar};

use crate::generate::GenerateError;

/// Default range for numeric values when unconstrained
pub const DEFAULT_RANGE: (f64, f64) = (0.0, 10.0);

/// Alphabet for `char` scalars
pub const CHAR_ALPHABET: &[u8] = b" abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Default cap on generated string length
pub const DEFAULT_MAX_STRING_LENGTH: usize = 100;

/// Source of random parameter values
#[derive(Debug)]
pub struct Randomiser<R: Rng = StdRng> {
    rng: R,
    max_string_length: usize,
}

impl Randomiser<StdRng> {
    /// Deterministic randomiser
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Randomiser seeded from the OS
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> Randomiser<R> {
    /// Wrap an RNG
    pub fn new(rng: R) -> Self {
        Self {
            rng,
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
        }
    }

    /// Override the string length cap used for strings without a size
    pub fn with_max_string_length(mut self, max: usize) -> Self {
        self.max_string_length = max;
        self
    }

    /// String length cap used for strings without a size
    pub fn max_string_length(&self) -> usize {
        self.max_string_length
    }

    /// Effective `[min, max]` for a parameter.
    ///
    /// A one-sided bound that falls outside the default range drags the other
    /// side along so the range stays the same width.
    fn range(name: &str, bounds: Bounds) -> Result<(f64, f64), GenerateError> {
        let (lo, hi) = DEFAULT_RANGE;
        let width = hi - lo;
        let (min, max) = match (bounds.min, bounds.max) {
            (Some(min), Some(max)) => (min, max),
            (Some(min), None) => (min, hi.max(min + width)),
            (None, Some(max)) => (lo.min(max - width), max),
            (None, None) => (lo, hi),
        };
        if min > max {
            return Err(GenerateError::Constraint {
                name: name.to_string(),
                min,
                max,
            });
        }
        Ok((min, max))
    }

    /// A uniformly distributed scalar within `bounds`
    pub fn scalar(
        &mut self,
        name: &str,
        primitive: Primitive,
        bounds: Bounds,
    ) -> Result<Scalar, GenerateError> {
        match primitive {
            Primitive::Int => {
                let (min, max) = Self::range(name, bounds)?;
                let min = min.ceil().max(f64::from(i32::MIN)) as i32;
                let max = max.floor().min(f64::from(i32::MAX)) as i32;
                if min > max {
                    return Err(GenerateError::Constraint {
                        name: name.to_string(),
                        min: f64::from(min),
                        max: f64::from(max),
                    });
                }
                Ok(Scalar::Int(self.rng.gen_range(min..=max)))
            }
            Primitive::Float => {
                let (min, max) = Self::range(name, bounds)?;
                Ok(Scalar::Float(self.real(min, max) as f32))
            }
            Primitive::Double => {
                let (min, max) = Self::range(name, bounds)?;
                Ok(Scalar::Double(self.real(min, max)))
            }
            Primitive::Char => Ok(Scalar::Char(self.char())),
            Primitive::Bool => Ok(Scalar::Bool(self.rng.r#gen())),
            Primitive::Void => Err(GenerateError::UnsupportedType(primitive.to_string())),
        }
    }

    fn real(&mut self, min: f64, max: f64) -> f64 {
        let unit: f64 = self.rng.r#gen();
        unit * (max - min) + min
    }

    fn char(&mut self) -> u8 {
        CHAR_ALPHABET.choose(&mut self.rng).copied().unwrap_or(b' ')
    }

    /// `len` independent scalars within `bounds`
    pub fn array(
        &mut self,
        name: &str,
        primitive: Primitive,
        bounds: Bounds,
        len: usize,
    ) -> Result<Vec<Scalar>, GenerateError> {
        (0..len)
            .map(|_| self.scalar(name, primitive, bounds))
            .collect()
    }

    /// A printable ASCII string with length uniform in `[0, bound)`
    pub fn string(&mut self, bound: usize) -> String {
        if bound == 0 {
            return String::new();
        }
        let len = self.rng.gen_range(0..bound);
        (0..len)
            .map(|_| char::from(self.rng.gen_range(0x20u8..=0x7e)))
            .collect()
    }
}
