//! Supervisor Process
//!
//! Runs each foreign call in a fresh worker process so a crash, abort or
//! infinite loop in native code cannot take the driver down with it.

use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use synthbench_core::{IPC_FD_ENV, Invocation, Invoke};
use synthbench_ipc::{
    FailureKind, FrameError, FrameReader, FrameWriter, InvocationRequest, SupervisorCommand,
    WorkerCapabilities, WorkerMessage,
};
use synthbench_model::{Bindings, FunctionSignature};
use thiserror::Error;
use tracing::warn;

/// Flag that turns the binary into a worker
pub const WORKER_FLAG: &str = "--synth-worker";

/// Default per-invocation timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Time a worker gets to exit after SIGTERM before it is killed
const TERMINATION_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Worker crashed: {0}")]
    WorkerCrashed(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Worker reported {kind:?} failure: {message}")]
    WorkerFailed { kind: FailureKind, message: String },

    #[error("Worker protocol error: expected {expected}, got {got}")]
    ProtocolError { expected: String, got: String },
}

impl From<FrameError> for SupervisorError {
    fn from(e: FrameError) -> Self {
        SupervisorError::IpcError(e.to_string())
    }
}

/// Result of polling for data
#[derive(Debug)]
enum PollResult {
    DataAvailable,
    Timeout,
    PipeClosed,
    Error(std::io::Error),
}

/// Wait for data to be available on a file descriptor with timeout
fn wait_for_data(fd: i32, timeout_ms: i32) -> PollResult {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    let result = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };

    if result < 0 {
        PollResult::Error(std::io::Error::last_os_error())
    } else if result == 0 {
        PollResult::Timeout
    } else if pollfd.revents & libc::POLLIN != 0 {
        // Data may still be queued behind a hang-up
        PollResult::DataAvailable
    } else if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        PollResult::PipeClosed
    } else {
        PollResult::Timeout
    }
}

/// Create a pipe pair, returning (read_fd, write_fd).
fn create_pipe() -> Result<(RawFd, RawFd), std::io::Error> {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // Close-on-exec by default; the child clears it on the ends it keeps.
    for &fd in &fds {
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
    Ok((fds[0], fds[1]))
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

/// Send SIGTERM to a process. Returns `Err` if the signal could not be delivered.
fn send_sigterm(pid: u32) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn describe_exit(status: ExitStatus) -> String {
    match status.signal() {
        Some(signal) => format!("terminated by signal {signal}"),
        None => format!("exited with {status}"),
    }
}

/// Worker process handle
pub struct WorkerHandle {
    child: Child,
    reader: FrameReader<std::fs::File>,
    writer: FrameWriter<std::fs::File>,
    capabilities: Option<WorkerCapabilities>,
    timeout: Duration,
    msg_read_fd: RawFd,
}

impl WorkerHandle {
    /// Spawn a worker from this executable
    pub fn spawn(timeout: Duration) -> Result<Self, SupervisorError> {
        let binary = std::env::current_exe()?;
        Self::spawn_binary(&binary, timeout)
    }

    /// Spawn `binary` as a worker, passing fd 3/4 for IPC
    pub fn spawn_binary(binary: &Path, timeout: Duration) -> Result<Self, SupervisorError> {
        // cmd_pipe: supervisor writes commands → worker reads from fd 3
        let (cmd_read, cmd_write) = create_pipe()?;
        // msg_pipe: worker writes messages from fd 4 → supervisor reads
        let (msg_read, msg_write) = match create_pipe() {
            Ok(fds) => fds,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        let mut command = Command::new(binary);
        command
            .arg(WORKER_FLAG)
            .env(IPC_FD_ENV, "3,4")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        unsafe {
            command.pre_exec(move || {
                if cmd_read != 3 {
                    libc::dup2(cmd_read, 3);
                    libc::close(cmd_read);
                }
                let flags = libc::fcntl(3, libc::F_GETFD);
                libc::fcntl(3, libc::F_SETFD, flags & !libc::FD_CLOEXEC);

                if msg_write != 4 {
                    libc::dup2(msg_write, 4);
                    libc::close(msg_write);
                }
                let flags = libc::fcntl(4, libc::F_GETFD);
                libc::fcntl(4, libc::F_SETFD, flags & !libc::FD_CLOEXEC);

                // Parent-side ends leaked into the child
                libc::close(cmd_write);
                libc::close(msg_read);

                Ok(())
            });
        }

        let child = match command.spawn() {
            Ok(c) => c,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                close_fd(msg_read);
                close_fd(msg_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        // Child-side ends belong to the child now
        close_fd(cmd_read);
        close_fd(msg_write);

        let writer_file = unsafe { std::fs::File::from_raw_fd(cmd_write) };
        let reader_file = unsafe { std::fs::File::from_raw_fd(msg_read) };

        let mut handle = Self {
            child,
            reader: FrameReader::new(reader_file),
            writer: FrameWriter::new(writer_file),
            capabilities: None,
            timeout,
            msg_read_fd: msg_read,
        };

        handle.wait_for_hello()?;
        Ok(handle)
    }

    /// Wait for Hello message from worker and validate protocol version
    fn wait_for_hello(&mut self) -> Result<(), SupervisorError> {
        let deadline = Instant::now() + self.timeout;
        match self.recv(deadline)? {
            WorkerMessage::Hello(caps) => {
                if caps.protocol_version != synthbench_ipc::PROTOCOL_VERSION {
                    return Err(SupervisorError::ProtocolError {
                        expected: format!(
                            "protocol version {}",
                            synthbench_ipc::PROTOCOL_VERSION
                        ),
                        got: format!("protocol version {}", caps.protocol_version),
                    });
                }
                self.capabilities = Some(caps);
                Ok(())
            }
            other => Err(SupervisorError::ProtocolError {
                expected: "Hello".to_string(),
                got: format!("{other:?}"),
            }),
        }
    }

    /// Get worker capabilities
    pub fn capabilities(&self) -> Option<&WorkerCapabilities> {
        self.capabilities.as_ref()
    }

    /// Perform one call on this worker.
    ///
    /// On timeout the worker is terminated before this returns.
    pub fn invoke(&mut self, request: InvocationRequest) -> Result<Invocation, SupervisorError> {
        self.writer.write(&SupervisorCommand::Invoke(request))?;

        let deadline = Instant::now() + self.timeout;
        let message = match self.recv(deadline) {
            Err(SupervisorError::Timeout(_)) => return Err(self.handle_timeout()),
            other => other?,
        };

        match message {
            WorkerMessage::Outcome {
                return_value,
                outputs,
            } => Ok(Invocation {
                return_value,
                outputs: Bindings::from_named(outputs),
            }),
            WorkerMessage::Failure { kind, message } => {
                Err(SupervisorError::WorkerFailed { kind, message })
            }
            WorkerMessage::Hello(_) => Err(SupervisorError::ProtocolError {
                expected: "Outcome/Failure".to_string(),
                got: "Hello".to_string(),
            }),
        }
    }

    /// Read the next message, giving up at `deadline`
    fn recv(&mut self, deadline: Instant) -> Result<WorkerMessage, SupervisorError> {
        while !self.reader.has_buffered_data() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SupervisorError::Timeout(self.timeout));
            }

            let poll_timeout = remaining.min(Duration::from_millis(100));
            match wait_for_data(self.msg_read_fd, poll_timeout.as_millis().max(1) as i32) {
                PollResult::DataAvailable => break,
                PollResult::Timeout => {
                    if !self.is_alive() {
                        return Err(self.crashed());
                    }
                }
                PollResult::PipeClosed => return Err(self.crashed()),
                PollResult::Error(e) => {
                    return Err(SupervisorError::WorkerCrashed(format!("Pipe error: {e}")));
                }
            }
        }

        match self.reader.read::<WorkerMessage>() {
            Ok(message) => Ok(message),
            Err(FrameError::EndOfStream) => Err(self.crashed()),
            Err(e) => {
                if self.is_alive() {
                    Err(SupervisorError::IpcError(e.to_string()))
                } else {
                    Err(self.crashed())
                }
            }
        }
    }

    /// Reap the worker after its pipe closed and describe how it ended
    fn crashed(&mut self) -> SupervisorError {
        let status = self.reap(TERMINATION_GRACE);
        let message = match status {
            Some(status) => describe_exit(status),
            None => "worker closed its pipe".to_string(),
        };
        SupervisorError::WorkerCrashed(message)
    }

    /// SIGTERM, wait out the grace period, then SIGKILL
    fn handle_timeout(&mut self) -> SupervisorError {
        // The worker may already be gone
        let _ = send_sigterm(self.child.id());
        self.reap(TERMINATION_GRACE);
        SupervisorError::Timeout(self.timeout)
    }

    /// Wait up to `grace` for the worker to exit, killing it otherwise
    fn reap(&mut self, grace: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(None) => {
                    let _ = self.child.kill();
                    return self.child.wait().ok();
                }
                Err(_) => return None,
            }
        }
    }

    /// Shutdown the worker gracefully
    pub fn shutdown(mut self) -> Result<(), SupervisorError> {
        self.writer.write(&SupervisorCommand::Shutdown)?;
        self.reap(TERMINATION_GRACE);
        Ok(())
    }

    /// Check if worker process is still running
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.is_alive() {
            let _ = send_sigterm(self.child.id());
            self.reap(Duration::from_millis(50));
        }
    }
}

/// Runs one function of one library, a fresh worker per call
#[derive(Debug, Clone)]
pub struct SandboxRunner {
    worker: PathBuf,
    library: PathBuf,
    signature: FunctionSignature,
    timeout: Duration,
}

impl SandboxRunner {
    /// Runner using this executable as the worker
    pub fn new(library: impl Into<PathBuf>, signature: FunctionSignature) -> std::io::Result<Self> {
        Ok(Self::with_worker(
            std::env::current_exe()?,
            library,
            signature,
        ))
    }

    /// Runner using `worker` as the worker executable
    pub fn with_worker(
        worker: impl Into<PathBuf>,
        library: impl Into<PathBuf>,
        signature: FunctionSignature,
    ) -> Self {
        Self {
            worker: worker.into(),
            library: library.into(),
            signature,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-invocation timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Library this runner calls into
    pub fn library(&self) -> &Path {
        &self.library
    }

    /// Call the function once in a fresh worker
    pub fn run(&self, inputs: &Bindings) -> Result<Invocation, SupervisorError> {
        let mut worker = WorkerHandle::spawn_binary(&self.worker, self.timeout)?;
        let invocation = worker.invoke(InvocationRequest {
            library: self.library.to_string_lossy().into_owned(),
            signature: self.signature.clone(),
            inputs: inputs.to_named(),
        })?;
        let _ = worker.shutdown();
        Ok(invocation)
    }
}

impl Invoke for SandboxRunner {
    fn invoke(&mut self, inputs: &Bindings) -> Option<Invocation> {
        match self.run(inputs) {
            Ok(invocation) => Some(invocation),
            Err(e) => {
                warn!(
                    library = %self.library.display(),
                    function = %self.signature.name,
                    error = %e,
                    "Invocation produced no result"
                );
                None
            }
        }
    }
}
