// Control channel between the running relay and short-lived CLI invocations:
// a shared-memory record guarded by a named semaphore, with signals as doorbells.

pub mod channel;
pub mod protocol;
pub mod semaphore;
pub mod server;
pub mod shm;

pub use channel::ControlChannel;
pub use protocol::{Command, ControlRecord};
pub use semaphore::{NamedSemaphore, Wait};
pub use server::{ControlHandler, SignalListener};

use std::io;
use thiserror::Error;

/// Name shared by the semaphore and the segment key.
pub const CHANNEL_NAME: &str = "/tempest_ipc";

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("already running (pid {pid})")]
    AlreadyRunning { pid: libc::pid_t },

    #[error("not running")]
    NotRunning,

    #[error("invalid command")]
    InvalidCommand,

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("control channel busy")]
    Busy,

    #[error("{op} failed: {source}")]
    Os {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl IpcError {
    pub fn last_os(op: &'static str) -> Self {
        IpcError::Os {
            op,
            source: io::Error::last_os_error(),
        }
    }

    /// Map an error code found in the control record.
    pub fn from_code(code: i32) -> Self {
        match code {
            libc::EEXIST => IpcError::AlreadyRunning { pid: 0 },
            libc::ENOENT => IpcError::NotRunning,
            libc::EINVAL => IpcError::InvalidCommand,
            libc::ETIMEDOUT => IpcError::Timeout("reply"),
            code => IpcError::Os {
                op: "request",
                source: io::Error::from_raw_os_error(code),
            },
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            IpcError::AlreadyRunning { .. } => libc::EEXIST,
            IpcError::NotRunning => libc::ENOENT,
            IpcError::InvalidCommand => libc::EINVAL,
            IpcError::Timeout(_) => libc::ETIMEDOUT,
            IpcError::Busy => libc::EAGAIN,
            IpcError::Os { source, .. } => source.raw_os_error().unwrap_or(1),
        }
    }
}

pub type Result<T> = std::result::Result<T, IpcError>;
