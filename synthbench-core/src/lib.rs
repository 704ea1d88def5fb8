#![warn(missing_docs)]
//! Synthbench Core - Execution and Evaluation
//!
//! This crate provides everything that touches a compiled function:
//! - Foreign execution bridge (`dlopen` + libffi) used inside workers
//! - Worker process entry point speaking the IPC protocol
//! - Constraint-driven random input generation
//! - Differential evaluation of candidates against recorded examples

mod bridge;
mod evaluate;
mod generate;
mod randomiser;
mod worker;

pub use bridge::{BridgeError, ForeignFunction, Library, PackedArgs, pack};
pub use evaluate::{EvaluateError, EvaluationResult, Evaluator, Failure};
pub use generate::{GenerateError, Generator};
pub use randomiser::{CHAR_ALPHABET, DEFAULT_MAX_STRING_LENGTH, DEFAULT_RANGE, Randomiser};
pub use worker::{IPC_FD_ENV, WorkerMain, shutdown_requested};

use synthbench_model::{Bindings, Value};

/// Observed results of one call
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Return value (`Value::Void` for void functions)
    pub return_value: Value,
    /// Output parameters after the call
    pub outputs: Bindings,
}

/// Something that can execute a function on bound inputs.
///
/// `None` means the call produced no result: the process crashed, timed out
/// or could not load the code.
pub trait Invoke {
    /// Execute once
    fn invoke(&mut self, inputs: &Bindings) -> Option<Invocation>;
}

impl<F> Invoke for F
where
    F: FnMut(&Bindings) -> Option<Invocation>,
{
    fn invoke(&mut self, inputs: &Bindings) -> Option<Invocation> {
        self(inputs)
    }
}
