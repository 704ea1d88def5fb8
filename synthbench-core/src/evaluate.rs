//! Differential Evaluator
//!
//! Replays a batch of examples against a candidate and tallies matches.

use std::fmt;

use synthbench_model::{Bindings, ExampleInstance, Value};
use thiserror::Error;

use crate::Invoke;

/// A candidate could not be executed at all
#[derive(Debug, Error)]
#[error("No value produced by `{function}` for example {example}")]
pub struct EvaluateError {
    /// Function being evaluated
    pub function: String,
    /// Index of the example that could not be run
    pub example: usize,
}

/// A content mismatch between expected and actual results
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    /// The example whose expectations were not met
    pub example: ExampleInstance,
    /// Return value the candidate produced
    pub actual_return: Value,
    /// Output parameters the candidate produced
    pub actual_outputs: Bindings,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input {} produced incorrect values (expected vs. actual); {} vs. {}; {} vs. {}",
            self.example.inputs,
            self.example.return_value,
            self.actual_return,
            self.example.outputs,
            self.actual_outputs,
        )
    }
}

/// Aggregate outcome of one evaluation run
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    /// Examples that matched
    pub passes: usize,
    /// Examples run
    pub tests: usize,
    /// Details of every mismatch
    pub failures: Vec<Failure>,
    /// Name of what was evaluated
    pub name: Option<String>,
}

impl EvaluationResult {
    /// Every test passed
    pub fn passed(&self) -> bool {
        self.passes == self.tests
    }

    /// No tests were run
    pub fn is_trivial(&self) -> bool {
        self.tests == 0
    }

    /// Summary, followed by each failure when `show_failures` is set
    pub fn full(&self, show_failures: bool) -> String {
        if !show_failures || self.failures.is_empty() {
            return self.to_string();
        }
        let failures: Vec<String> = self.failures.iter().map(|f| format!(" >> {f}")).collect();
        format!("{self}\n\n{}", failures.join("\n"))
    }
}

impl fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{name}: ")?;
        }
        let status = if self.is_trivial() {
            "TRIVIAL"
        } else if self.passed() {
            "OK"
        } else {
            "NOT OK"
        };
        write!(f, "passed {}/{} tests ({status})", self.passes, self.tests)
    }
}

/// Checks a candidate against recorded examples
#[derive(Debug, Clone)]
pub struct Evaluator {
    function: String,
}

impl Evaluator {
    /// Evaluator for the function named `function`
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
        }
    }

    /// Run one example; `Ok(None)` when the candidate matched
    pub fn check_example(
        &self,
        index: usize,
        example: &ExampleInstance,
        candidate: &mut impl Invoke,
    ) -> Result<Option<Failure>, EvaluateError> {
        let actual = candidate
            .invoke(&example.inputs)
            .ok_or_else(|| EvaluateError {
                function: self.function.clone(),
                example: index,
            })?;

        if example.return_value.matches(&actual.return_value)
            && example.outputs.matches(&actual.outputs)
        {
            return Ok(None);
        }
        Ok(Some(Failure {
            example: example.clone(),
            actual_return: actual.return_value,
            actual_outputs: actual.outputs,
        }))
    }

    /// Run every example in order.
    ///
    /// Mismatches are collected; a candidate that cannot be executed on any
    /// example aborts the run.
    pub fn check(
        &self,
        examples: &[ExampleInstance],
        candidate: &mut impl Invoke,
    ) -> Result<EvaluationResult, EvaluateError> {
        let mut passes = 0;
        let mut failures = Vec::new();
        for (index, example) in examples.iter().enumerate() {
            match self.check_example(index, example, candidate)? {
                None => passes += 1,
                Some(failure) => failures.push(failure),
            }
        }
        Ok(EvaluationResult {
            passes,
            tests: examples.len(),
            failures,
            name: Some(self.function.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Invocation;
    use synthbench_model::Scalar;

    fn example(x: f64, expected: f64) -> ExampleInstance {
        let mut inputs = Bindings::new();
        inputs.insert("x", Value::Scalar(Scalar::Double(x)));
        ExampleInstance {
            inputs,
            return_value: Value::Scalar(Scalar::Double(expected)),
            outputs: Bindings::new(),
        }
    }

    fn returning(value: f64) -> impl FnMut(&Bindings) -> Option<Invocation> {
        move |_| {
            Some(Invocation {
                return_value: Value::Scalar(Scalar::Double(value)),
                outputs: Bindings::new(),
            })
        }
    }

    #[test]
    fn test_nan_equality_policy() {
        let evaluator = Evaluator::new("f");
        let nan = [example(0.0, f64::NAN)];
        assert!(evaluator.check(&nan, &mut returning(f64::NAN)).unwrap().passed());
        assert!(!evaluator.check(&nan, &mut returning(1.0)).unwrap().passed());
        let one = [example(0.0, 1.0)];
        assert!(evaluator.check(&one, &mut returning(1.0)).unwrap().passed());
    }

    #[test]
    fn test_output_mismatch_recorded() {
        let mut expected = example(1.0, 0.0);
        expected.outputs.insert("s", Value::Str("HI".into()));
        let mut candidate = |_: &Bindings| {
            let mut outputs = Bindings::new();
            outputs.insert("s", Value::Str("hi".into()));
            Some(Invocation {
                return_value: Value::Scalar(Scalar::Double(0.0)),
                outputs,
            })
        };
        let result = Evaluator::new("upper")
            .check(&[expected], &mut candidate)
            .unwrap();
        assert_eq!((result.passes, result.tests), (0, 1));
        assert_eq!(result.failures[0].actual_outputs.get("s"), Some(&Value::Str("hi".into())));
        assert!(result.full(true).contains(">> input {x: 1}"));
    }

    #[test]
    fn test_unrunnable_candidate_is_error() {
        let examples = [example(0.0, 0.0), example(1.0, 1.0)];
        let err = Evaluator::new("f")
            .check(&examples, &mut |_: &Bindings| -> Option<Invocation> { None })
            .unwrap_err();
        assert_eq!(err.example, 0);
    }

    #[test]
    fn test_empty_batch_is_trivial() {
        let result = Evaluator::new("f").check(&[], &mut returning(0.0)).unwrap();
        assert!(result.is_trivial());
        assert!(result.to_string().ends_with("(TRIVIAL)"));
    }

    #[test]
    fn test_repeat_evaluation_is_stable() {
        let examples = [example(0.0, 1.0), example(1.0, 2.0)];
        let evaluator = Evaluator::new("f");
        let first = evaluator.check(&examples, &mut returning(1.0)).unwrap();
        let second = evaluator.check(&examples, &mut returning(1.0)).unwrap();
        assert_eq!((first.passes, first.tests), (second.passes, second.tests));
        assert_eq!(first.passes, 1);
    }
}
