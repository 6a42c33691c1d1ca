// POSIX named semaphore used as a cross-process mutex.

use super::{IpcError, Result};
use std::ffi::CString;
use std::io;
use std::time::Duration;

const PERMISSIONS: libc::c_uint = 0o660;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Fail with `Busy` if the lock is held.
    Immediate,
    /// Fail with `Timeout` after the given duration.
    Timeout(Duration),
    Forever,
}

pub struct NamedSemaphore {
    handle: *mut libc::sem_t,
}

// The handle is only used through sem_* calls, which are thread safe.
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    /// Open the semaphore, creating it unlocked if it does not exist.
    pub fn open(name: &str) -> Result<Self> {
        let name = c_name(name)?;
        let handle = unsafe {
            libc::sem_open(
                name.as_ptr(),
                libc::O_CREAT,
                PERMISSIONS,
                1 as libc::c_uint,
            )
        };
        if handle == libc::SEM_FAILED {
            return Err(IpcError::last_os("sem_open"));
        }
        Ok(Self { handle })
    }

    pub fn acquire(&self, wait: Wait) -> Result<SemaphoreGuard<'_>> {
        loop {
            let rc = match wait {
                Wait::Immediate => unsafe { libc::sem_trywait(self.handle) },
                Wait::Timeout(timeout) => {
                    let deadline = deadline_after(timeout);
                    unsafe { libc::sem_timedwait(self.handle, &deadline) }
                }
                Wait::Forever => unsafe { libc::sem_wait(self.handle) },
            };
            if rc == 0 {
                return Ok(SemaphoreGuard { semaphore: self });
            }

            let error = io::Error::last_os_error();
            match error.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EAGAIN) => return Err(IpcError::Busy),
                Some(libc::ETIMEDOUT) => return Err(IpcError::Timeout("control lock")),
                _ => {
                    return Err(IpcError::Os {
                        op: "sem_wait",
                        source: error,
                    })
                }
            }
        }
    }

    /// Remove the name from the system. Open handles stay usable.
    pub fn unlink(name: &str) -> Result<()> {
        let name = c_name(name)?;
        if unsafe { libc::sem_unlink(name.as_ptr()) } != 0 {
            return Err(IpcError::last_os("sem_unlink"));
        }
        Ok(())
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.handle);
        }
    }
}

/// Holds the semaphore until dropped.
pub struct SemaphoreGuard<'a> {
    semaphore: &'a NamedSemaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            libc::sem_post(self.semaphore.handle);
        }
    }
}

fn c_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| IpcError::Os {
        op: "sem_open",
        source: io::Error::new(io::ErrorKind::InvalidInput, "name contains NUL"),
    })
}

/// Absolute CLOCK_REALTIME deadline as expected by sem_timedwait.
fn deadline_after(timeout: Duration) -> libc::timespec {
    let mut now: libc::timespec = unsafe { std::mem::zeroed() };
    unsafe {
        libc::clock_gettime(libc::CLOCK_REALTIME, &mut now);
    }

    let nanos = now.tv_nsec as i64 + timeout.subsec_nanos() as i64;
    let mut deadline: libc::timespec = unsafe { std::mem::zeroed() };
    deadline.tv_sec =
        now.tv_sec + (timeout.as_secs() as i64 + nanos / 1_000_000_000) as libc::time_t;
    deadline.tv_nsec = (nanos % 1_000_000_000) as _;
    deadline
}
