use super::protocol::{Command, ControlRecord};
use super::semaphore::{NamedSemaphore, Wait};
use super::shm::{self, SharedSegment};
use super::{IpcError, Result};
use log::{debug, info, warn};
use signal_hook::consts::SIGUSR1;
use signal_hook::iterator::Signals;
use std::thread;
use std::time::{Duration, Instant};

/// Lock timeout for short-lived clients.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const REPLY_POLL: Duration = Duration::from_millis(20);

/// One process's handle on the shared control record.
pub struct ControlChannel {
    semaphore: NamedSemaphore,
    segment: SharedSegment,
    pid: libc::pid_t,
}

impl ControlChannel {
    /// Open the channel, clearing a segment left behind by a crashed instance. `wait` bounds
    /// how long to wait for the control lock.
    pub fn open(name: &str, wait: Wait) -> Result<Self> {
        let semaphore = NamedSemaphore::open(name)?;
        let key = shm::key_for(name);

        let segment = {
            let _guard = semaphore.acquire(wait)?;
            if shm::remove_ghost(key)? {
                info!("[IPC] Removed stale control segment");
            }
            SharedSegment::attach(key)?
        };

        Ok(Self {
            semaphore,
            segment,
            pid: std::process::id() as libc::pid_t,
        })
    }

    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    fn with_record<R>(&self, wait: Wait, f: impl FnOnce(&mut ControlRecord) -> R) -> Result<R> {
        let _guard = self.semaphore.acquire(wait)?;
        // The semaphore is held until `_guard` drops.
        let record = unsafe { self.segment.record_mut() }
            .ok_or_else(|| IpcError::Os {
                op: "shmat",
                source: std::io::Error::from(std::io::ErrorKind::NotConnected),
            })?;
        Ok(f(record))
    }

    /// Claim the single-instance slot for this process.
    pub fn register(&self) -> Result<()> {
        let pid = self.pid;
        self.with_record(Wait::Forever, |record| record.register_server(pid))??;
        info!("[IPC] Registered as server (pid {})", pid);
        Ok(())
    }

    pub fn server_pid(&self) -> Result<Option<libc::pid_t>> {
        self.with_record(Wait::Timeout(LOCK_TIMEOUT), |record| {
            Some(record.server_pid).filter(|&pid| pid != 0)
        })
    }

    /// Write a request for the registered server without signalling it.
    pub fn post(&self, command: Command) -> Result<libc::pid_t> {
        let pid = self.pid;
        self.with_record(Wait::Timeout(LOCK_TIMEOUT), |record| {
            record.post_request(pid, command)
        })?
    }

    /// Write a request and ring the server.
    pub fn dispatch(&self, command: Command) -> Result<libc::pid_t> {
        let server = self.post(command)?;
        send_signal(server, command.signal())?;
        debug!("[IPC] Sent {:?} to pid {}", command, server);
        Ok(server)
    }

    /// Fill in the answer to the outstanding request and return the client pid.
    pub fn respond<F>(&self, stats: F, version: &str) -> Result<libc::pid_t>
    where
        F: FnOnce() -> String,
    {
        self.with_record(Wait::Forever, |record| record.respond(stats, version))
    }

    /// Answer the outstanding request and ring the client.
    pub fn answer<F>(&self, stats: F, version: &str) -> Result<()>
    where
        F: FnOnce() -> String,
    {
        let client = self.respond(stats, version)?;
        if client == 0 {
            debug!("[IPC] No unanswered request");
            return Ok(());
        }
        send_signal(client, libc::SIGUSR1)
    }

    /// Read and clear the server's answer, if it has arrived.
    pub fn collect(&self) -> Result<Option<String>> {
        self.with_record(Wait::Timeout(LOCK_TIMEOUT), ControlRecord::take_response)?
    }

    /// Send `command` to the running server. Stop returns without waiting; stats and version
    /// wait up to `timeout` for the reply.
    pub fn request(&self, command: Command, timeout: Duration) -> Result<Option<String>> {
        if command == Command::Stop {
            self.dispatch(command)?;
            return Ok(None);
        }

        // Registered before dispatching so an early reply is not lost.
        let mut signals = Signals::new([SIGUSR1]).map_err(|source| IpcError::Os {
            op: "signal registration",
            source,
        })?;
        self.dispatch(command)?;

        let deadline = Instant::now() + timeout;
        loop {
            if signals.pending().any(|signal| signal == SIGUSR1) {
                if let Some(reply) = self.collect()? {
                    return Ok(Some(reply));
                }
            }
            if Instant::now() >= deadline {
                return Err(IpcError::Timeout("reply"));
            }
            thread::sleep(REPLY_POLL);
        }
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        let pid = self.pid;
        let guard = self.semaphore.acquire(Wait::Timeout(LOCK_TIMEOUT));
        if let Err(e) = &guard {
            warn!("[IPC] Tearing down without the control lock: {}", e);
        }

        if let Some(record) = unsafe { self.segment.record_mut() } {
            if record.release_server(pid) {
                info!("[IPC] Released server registration");
            }
        }
        match self.segment.detach() {
            Ok(true) => debug!("[IPC] Removed control segment"),
            Ok(false) => {}
            Err(e) => warn!("[IPC] Failed to detach control segment: {}", e),
        }
        drop(guard);
    }
}

fn send_signal(pid: libc::pid_t, signal: libc::c_int) -> Result<()> {
    if unsafe { libc::kill(pid, signal) } == -1 {
        let error = std::io::Error::last_os_error();
        if error.raw_os_error() == Some(libc::ESRCH) {
            return Err(IpcError::NotRunning);
        }
        return Err(IpcError::Os {
            op: "kill",
            source: error,
        });
    }
    Ok(())
}
