//! Random Input Generator
//!
//! Builds constraint-satisfying input bindings in safe order and runs each
//! accepted binding through the reference to record its expected results.

use rand::Rng;
use rand::rngs::StdRng;
use synthbench_model::{
    Bindings, ExampleInstance, ExprError, FunctionSignature, ModelError, Parameter, Value,
};
use thiserror::Error;
use tracing::{debug, error};

use crate::Invoke;
use crate::randomiser::Randomiser;

/// Errors raised while generating inputs
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The constraints on a parameter leave an empty range
    #[error("Constraints on `{name}` leave an empty range [{min}, {max}]")]
    Constraint {
        /// Parameter name
        name: String,
        /// Effective lower bound
        min: f64,
        /// Effective upper bound
        max: f64,
    },

    /// A parameter type has no random value source
    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    /// A constraint predicate could not be evaluated
    #[error(transparent)]
    Expr(#[from] ExprError),

    /// A size could not be resolved
    #[error(transparent)]
    Model(ModelError),
}

impl From<ModelError> for GenerateError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Constraint { name, min, max } => {
                GenerateError::Constraint { name, min, max }
            }
            ModelError::UnsupportedType(ty) => GenerateError::UnsupportedType(ty),
            ModelError::Expr(e) => GenerateError::Expr(e),
            other => GenerateError::Model(other),
        }
    }
}

/// Produces examples for one signature
pub struct Generator<'a, R: Rng = StdRng> {
    signature: &'a FunctionSignature,
    randomiser: Randomiser<R>,
}

impl<'a, R: Rng> Generator<'a, R> {
    /// Create a generator drawing from `randomiser`
    pub fn new(signature: &'a FunctionSignature, randomiser: Randomiser<R>) -> Self {
        Self {
            signature,
            randomiser,
        }
    }

    /// The signature being generated for
    pub fn signature(&self) -> &FunctionSignature {
        self.signature
    }

    /// Generate up to `n` examples, executing `reference` on each accepted input.
    ///
    /// Rejected inputs draw from a fail budget of `n` shared across the batch.
    /// If the reference cannot be executed the examples gathered so far are
    /// returned.
    pub fn generate(
        &mut self,
        n: usize,
        reference: &mut impl Invoke,
    ) -> Result<Vec<ExampleInstance>, GenerateError> {
        let mut examples = Vec::with_capacity(n);
        let mut fails = 0;

        while fails < n && examples.len() < n {
            let inputs = self.generate_inputs()?;
            if !self.signature.satisfied(&inputs)? {
                fails += 1;
                debug!(
                    function = %self.signature.name,
                    fails,
                    "Rejected inputs violating constraints"
                );
                continue;
            }

            let Some(invocation) = reference.invoke(&inputs) else {
                error!(
                    function = %self.signature.name,
                    generated = examples.len(),
                    "Could not execute reference, stopping generation"
                );
                break;
            };

            examples.push(ExampleInstance {
                inputs,
                return_value: invocation.return_value,
                outputs: invocation.outputs,
            });
        }

        Ok(examples)
    }

    /// One full input binding, generated in safe order
    pub fn generate_inputs(&mut self) -> Result<Bindings, GenerateError> {
        let mut inputs = Bindings::new();
        for param in self.signature.safe_order() {
            let value = self.random(param, &inputs)?;
            inputs.insert(param.name.clone(), value);
        }
        Ok(inputs)
    }

    fn random(&mut self, param: &Parameter, current: &Bindings) -> Result<Value, GenerateError> {
        let primitive = param.ctype.primitive;
        let bounds = param.bounds(current)?;

        if !param.is_array() {
            return Ok(Value::Scalar(
                self.randomiser.scalar(&param.name, primitive, bounds)?,
            ));
        }

        let size = match &param.size {
            Some(spec) => Some(spec.evaluate(&param.name, current, true, None)?),
            None => None,
        };

        if param.is_string() {
            let bound = size.unwrap_or(self.randomiser.max_string_length());
            return Ok(Value::Str(self.randomiser.string(bound)));
        }

        let len = size.ok_or_else(|| ModelError::InvalidSize {
            array: param.name.clone(),
            message: "array has no size".to_string(),
        })?;
        Ok(Value::Array(
            self.randomiser.array(&param.name, primitive, bounds, len)?,
        ))
    }
}
