#![warn(missing_docs)]
//! Synthbench IPC Protocol
//!
//! Length-prefixed rkyv frames for supervisor-worker communication.
//! The supervisor sends one invocation per worker; the worker answers with
//! the call's outcome or a categorized failure.

mod framing;
mod messages;

pub use framing::{FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE, read_frame, write_frame};
pub use messages::{
    FailureKind, InvocationRequest, SupervisorCommand, WorkerCapabilities, WorkerMessage,
};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use synthbench_model::{
        Bindings, CType, FunctionSignature, Parameter, Primitive, Scalar, SizeSpec, Value,
    };

    #[test]
    fn test_invoke_roundtrip() {
        let signature = FunctionSignature::new(
            "sum",
            CType::scalar(Primitive::Int),
            vec![
                Parameter::new("a", CType::pointer(Primitive::Int))
                    .sized(SizeSpec::Var { var: "n".into() }),
                Parameter::new("n", CType::scalar(Primitive::Int)),
            ],
        );
        let mut inputs = Bindings::new();
        inputs.insert("n", Value::Scalar(Scalar::Int(2)));
        inputs.insert("a", Value::Array(vec![Scalar::Int(4), Scalar::Int(5)]));

        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            writer
                .write(&SupervisorCommand::Invoke(InvocationRequest {
                    library: "/tmp/libsum.so".into(),
                    signature: signature.clone(),
                    inputs: inputs.to_named(),
                }))
                .unwrap();
            writer.write(&SupervisorCommand::Shutdown).unwrap();
        }

        let mut reader = FrameReader::new(Cursor::new(buffer));
        match reader.read::<SupervisorCommand>().unwrap() {
            SupervisorCommand::Invoke(request) => {
                assert_eq!(request.library, "/tmp/libsum.so");
                assert_eq!(request.signature, signature);
                assert_eq!(Bindings::from_named(request.inputs), inputs);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(matches!(
            reader.read::<SupervisorCommand>().unwrap(),
            SupervisorCommand::Shutdown
        ));
    }

    #[test]
    fn test_outcome_roundtrip() {
        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            writer
                .write(&WorkerMessage::Outcome {
                    return_value: Value::Scalar(Scalar::Double(f64::NAN)),
                    outputs: vec![],
                })
                .unwrap();
        }
        let mut reader = FrameReader::new(Cursor::new(buffer));
        match reader.read::<WorkerMessage>().unwrap() {
            WorkerMessage::Outcome { return_value, .. } => {
                assert!(return_value.matches(&Value::Scalar(Scalar::Double(f64::NAN))));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
