//! IPC Message Types
//!
//! All messages are serialized with rkyv for zero-copy deserialization.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use synthbench_model::{FunctionSignature, NamedValue, Value};

/// Worker identity advertised during handshake
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct WorkerCapabilities {
    /// Protocol version for compatibility
    pub protocol_version: u32,
    /// Worker process id, for supervisor logs
    pub pid: u32,
}

impl Default for WorkerCapabilities {
    fn default() -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            pid: std::process::id(),
        }
    }
}

/// One foreign call to perform
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct InvocationRequest {
    /// Path of the shared library to load
    pub library: String,
    /// Signature of the symbol to call
    pub signature: FunctionSignature,
    /// Input bindings
    pub inputs: Vec<NamedValue>,
}

/// Messages sent from Worker to Supervisor
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WorkerMessage {
    /// Initial handshake with worker capabilities
    Hello(WorkerCapabilities),

    /// The call returned
    Outcome {
        /// Return value (`Void` for void functions)
        return_value: Value,
        /// Values of the output parameters after the call
        outputs: Vec<NamedValue>,
    },

    /// The call could not be performed
    Failure {
        /// Error category
        kind: FailureKind,
        /// Human-readable error message
        message: String,
    },
}

/// Categories of invocation failures reported by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum FailureKind {
    /// The library could not be opened or the symbol was missing
    Load,
    /// Inputs could not be converted to the foreign representation
    Marshal,
    /// The signature uses a type the bridge cannot call
    Unsupported,
    /// Rust panic (caught)
    Panic,
    /// Unknown error
    Unknown,
}

/// Commands sent from Supervisor to Worker
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum SupervisorCommand {
    /// Perform one call and report the outcome
    Invoke(InvocationRequest),

    /// Request graceful shutdown
    Shutdown,

    /// Ping for health check
    Ping,
}
