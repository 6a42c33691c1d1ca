//! UDP receiver and HTTP transmitter sharing one aggregation store.

pub mod format;
pub mod receiver;
pub mod submit;
pub mod transmitter;

pub use format::Payload;
pub use submit::{HttpSubmitter, StdoutSubmitter, Submitter};

use crate::codec::{self, Applied};
use crate::config::{OutputFormat, RelayConfig};
use crate::ipc::ControlHandler;
use crate::store::{AggregationStore, BoundedQueue};
use log::{error, info};
use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("UDP receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("submit to {url} failed: {message}")]
    Submit { url: String, message: String },

    #[error("collector {url} answered HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write payload: {0}")]
    Output(#[source] io::Error),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{0} thread panicked")]
    Panicked(&'static str),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RelayError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RelayError::Config(_) => 64,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

/// State guarded by the relay lock.
#[derive(Debug)]
pub struct RelayState {
    pub store: AggregationStore,
    /// Set by the receiver when the transmitter should not wait for the interval.
    pub pending: bool,
    /// Raw datagrams waiting to be forwarded in json format.
    pub passthrough: BoundedQueue<String>,
}

pub struct Relay {
    config: RelayConfig,
    state: Mutex<RelayState>,
    wake: Condvar,
    exit: AtomicBool,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        let state = RelayState {
            store: AggregationStore::new(config.queue_max),
            pending: false,
            passthrough: BoundedQueue::new(config.queue_max),
        };
        Self {
            config,
            state: Mutex::new(state),
            wake: Condvar::new(),
            exit: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_stopping(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }

    /// Ask both workers to finish. Safe to call from any thread, any number of times.
    pub fn stop(&self) {
        self.exit.store(true, Ordering::SeqCst);
        // Taking the lock orders the flag against a transmitter about to wait.
        drop(self.lock());
        self.wake.notify_all();
    }

    /// Block until notified, stopped or `timeout` elapses. Returns `None` once stopping.
    pub fn wait_for_work(&self, timeout: Duration) -> Option<MutexGuard<'_, RelayState>> {
        let guard = self.lock();
        let (mut guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |state| {
                !state.pending && !self.is_stopping()
            })
            .unwrap_or_else(|e| e.into_inner());

        if self.is_stopping() {
            return None;
        }
        guard.pending = false;
        Some(guard)
    }

    /// Decode one datagram into the store and wake the transmitter if it is worth relaying.
    pub fn ingest(&self, datagram: &[u8]) -> Applied {
        let mut state = self.lock();
        let applied = codec::apply_datagram(&mut state.store, datagram);

        let wake = match self.config.format {
            OutputFormat::Json if applied.is_valid() => {
                let text = String::from_utf8_lossy(datagram).into_owned();
                state.passthrough.push(text);
                true
            }
            OutputFormat::Json => false,
            OutputFormat::Rest | OutputFormat::Ecowitt => applied.notify,
        };

        if wake {
            state.pending = true;
            drop(state);
            self.wake.notify_one();
        }
        applied
    }

    /// Text report served to the stats control command.
    pub fn stats(&self) -> String {
        self.lock().store.report()
    }

    /// Bind the UDP port and run both workers until stopped or one of them fails.
    pub fn run(self: &Arc<Self>, submitter: Box<dyn Submitter>) -> Result<()> {
        let socket = match receiver::bind(self.config.port, self.config.io_timeout()) {
            Ok(socket) => socket,
            Err(e) => {
                self.stop();
                return Err(e);
            }
        };
        self.run_with_socket(socket, submitter)
    }

    pub fn run_with_socket(
        self: &Arc<Self>,
        socket: UdpSocket,
        submitter: Box<dyn Submitter>,
    ) -> Result<()> {
        info!(
            "[RELAY] Starting: format={}, interval={}s, collector={}",
            self.config.format,
            self.config.interval_secs,
            self.config.url.as_deref().unwrap_or("stdout")
        );

        let receiver = spawn_worker(self, "receiver", move |relay| receiver::run(relay, socket))?;
        let transmitter = match spawn_worker(self, "transmitter", move |relay| {
            transmitter::run(relay, submitter)
        }) {
            Ok(handle) => handle,
            Err(e) => {
                self.stop();
                let _ = join_worker("receiver", receiver);
                return Err(e);
            }
        };

        let received = join_worker("receiver", receiver);
        let transmitted = join_worker("transmitter", transmitter);
        info!("[RELAY] Stopped");
        received.and(transmitted)
    }
}

impl ControlHandler for Relay {
    fn stats(&self) -> String {
        Relay::stats(self)
    }

    fn version(&self) -> String {
        crate::get_version()
    }

    fn shutdown(&self) {
        self.stop();
    }
}

/// Stops the relay if the owning worker unwinds, so its peer does not outlive it.
struct StopOnPanic(Arc<Relay>);

impl Drop for StopOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            let current = thread::current();
            error!(
                "[RELAY] {} unwinding, stopping relay",
                current.name().unwrap_or("worker")
            );
            self.0.stop();
        }
    }
}

fn spawn_worker<F>(
    relay: &Arc<Relay>,
    name: &'static str,
    work: F,
) -> Result<JoinHandle<Result<()>>>
where
    F: FnOnce(&Arc<Relay>) -> Result<()> + Send + 'static,
{
    let relay = Arc::clone(relay);
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let guard = StopOnPanic(relay);
            work(&guard.0)
        })
        .map_err(|source| RelayError::Spawn { name, source })
}

fn join_worker(name: &'static str, handle: JoinHandle<Result<()>>) -> Result<()> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => {
            error!("[RELAY] {} thread panicked", name);
            Err(RelayError::Panicked(name))
        }
    }
}
