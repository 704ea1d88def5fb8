//! Worker Process Entry Point
//!
//! Handles the worker side of the supervisor-worker architecture: loads the
//! requested library, performs the call and reports back.
//!
//! On Unix, uses fd 3/4 for IPC (set via `SYNTH_IPC_FD` env var) and installs
//! a SIGTERM handler for graceful shutdown. On non-Unix, falls back to
//! stdin/stdout and skips signal handling.

use std::sync::atomic::{AtomicBool, Ordering};

use synthbench_ipc::{
    FailureKind, FrameError, FrameReader, FrameWriter, InvocationRequest, SupervisorCommand,
    WorkerCapabilities, WorkerMessage,
};
use synthbench_model::{Bindings, ModelError};

use crate::bridge::{BridgeError, ForeignFunction, Library};

#[cfg(unix)]
use std::os::unix::io::FromRawFd;

/// Environment variable naming the `<read_fd>,<write_fd>` pair
pub const IPC_FD_ENV: &str = "SYNTH_IPC_FD";

/// Global flag set by SIGTERM handler to request graceful shutdown.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check if a graceful shutdown has been requested via SIGTERM.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// Install a SIGTERM handler that sets the `SHUTDOWN_REQUESTED` flag.
/// The handler is async-signal-safe (only sets an atomic).
#[cfg(unix)]
fn install_sigterm_handler() {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigterm_handler as *const () as usize;
        sa.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut sa.sa_mask);
        libc::sigaction(libc::SIGTERM, &sa, std::ptr::null_mut());
    }
}

#[cfg(unix)]
extern "C" fn sigterm_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

/// No-op on non-Unix (no SIGTERM equivalent).
#[cfg(not(unix))]
fn install_sigterm_handler() {}

/// IPC transport: either inherited fd pair or stdin/stdout fallback.
enum IpcTransport {
    #[cfg(unix)]
    Fds { read_fd: i32, write_fd: i32 },
    Stdio,
}

fn detect_transport() -> IpcTransport {
    #[cfg(unix)]
    if let Ok(val) = std::env::var(IPC_FD_ENV) {
        if let Some((r, w)) = val.split_once(',') {
            if let (Ok(r), Ok(w)) = (r.parse::<i32>(), w.parse::<i32>()) {
                return IpcTransport::Fds {
                    read_fd: r,
                    write_fd: w,
                };
            }
        }
        eprintln!(
            "synthbench: warning: invalid {IPC_FD_ENV}={val:?} (expected format: <read_fd>,<write_fd>), falling back to stdio"
        );
    }
    IpcTransport::Stdio
}

/// Worker main loop
pub struct WorkerMain {
    reader: FrameReader<Box<dyn std::io::Read>>,
    writer: FrameWriter<Box<dyn std::io::Write>>,
}

impl WorkerMain {
    /// Create a new worker, using fd 3/4 if `SYNTH_IPC_FD` is set, otherwise stdin/stdout.
    pub fn new() -> Self {
        match detect_transport() {
            #[cfg(unix)]
            IpcTransport::Fds { read_fd, write_fd } => {
                let read_file = unsafe { std::fs::File::from_raw_fd(read_fd) };
                let write_file = unsafe { std::fs::File::from_raw_fd(write_fd) };
                Self::with_streams(Box::new(read_file), Box::new(write_file))
            }
            IpcTransport::Stdio => {
                Self::with_streams(Box::new(std::io::stdin()), Box::new(std::io::stdout()))
            }
        }
    }

    /// Create a worker over explicit streams
    pub fn with_streams(reader: Box<dyn std::io::Read>, writer: Box<dyn std::io::Write>) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
        }
    }

    /// Run the worker main loop until shutdown or the supervisor hangs up
    pub fn run(&mut self) -> Result<(), FrameError> {
        install_sigterm_handler();

        self.writer
            .write(&WorkerMessage::Hello(WorkerCapabilities::default()))?;

        loop {
            if shutdown_requested() {
                break;
            }

            let command: SupervisorCommand = match self.reader.read() {
                Ok(command) => command,
                Err(FrameError::EndOfStream) => break,
                Err(e) => return Err(e),
            };

            match command {
                SupervisorCommand::Invoke(request) => {
                    let reply = Self::invoke(request);
                    self.writer.write(&reply)?;
                }
                SupervisorCommand::Ping => {
                    self.writer
                        .write(&WorkerMessage::Hello(WorkerCapabilities::default()))?;
                }
                SupervisorCommand::Shutdown => break,
            }
        }

        Ok(())
    }

    /// Perform one call, turning every failure into a reply
    fn invoke(request: InvocationRequest) -> WorkerMessage {
        let InvocationRequest {
            library,
            signature,
            inputs,
        } = request;
        let inputs = Bindings::from_named(inputs);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let library = Library::open(&library)?;
            let function = ForeignFunction::new(&library, &signature)?;
            function.invoke(&inputs)
        }));

        match result {
            Ok(Ok(invocation)) => WorkerMessage::Outcome {
                return_value: invocation.return_value,
                outputs: invocation.outputs.to_named(),
            },
            Ok(Err(err)) => WorkerMessage::Failure {
                kind: failure_kind(&err),
                message: err.to_string(),
            },
            Err(panic) => {
                let message = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                WorkerMessage::Failure {
                    kind: FailureKind::Panic,
                    message,
                }
            }
        }
    }
}

fn failure_kind(err: &BridgeError) -> FailureKind {
    match err {
        BridgeError::Load { .. } | BridgeError::Symbol { .. } => FailureKind::Load,
        BridgeError::MissingInput(_) | BridgeError::Marshal { .. } => FailureKind::Marshal,
        BridgeError::Model(ModelError::UnsupportedType(_)) => FailureKind::Unsupported,
        BridgeError::Model(_) => FailureKind::Marshal,
    }
}

impl Default for WorkerMain {
    fn default() -> Self {
        Self::new()
    }
}
