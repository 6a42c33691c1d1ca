// Dedicated signal thread serving control requests for the running relay.

use super::channel::ControlChannel;
use super::{IpcError, Result};
use log::{error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1};
use signal_hook::iterator::{Handle, Signals};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// What the signal thread needs from the process it serves.
pub trait ControlHandler: Send + Sync + 'static {
    fn stats(&self) -> String;
    fn version(&self) -> String;
    /// Begin an orderly shutdown.
    fn shutdown(&self);
}

/// Owns the signal thread. Signals are captured from `spawn` until `close`.
pub struct SignalListener {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalListener {
    /// Start capturing SIGINT, SIGTERM and SIGUSR1. Call before registering as server so a
    /// request can never hit the default signal action.
    pub fn spawn<H: ControlHandler>(channel: Arc<ControlChannel>, handler: Arc<H>) -> Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM, SIGUSR1]).map_err(|source| {
            IpcError::Os {
                op: "signal registration",
                source,
            }
        })?;
        let handle = signals.handle();

        let thread = thread::Builder::new()
            .name("signals".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    match signal {
                        SIGUSR1 => {
                            let version = handler.version();
                            if let Err(e) = channel.answer(|| handler.stats(), &version) {
                                warn!("[IPC] Failed to answer control request: {}", e);
                            }
                        }
                        _ => {
                            info!("[IPC] Received signal {}, shutting down", signal);
                            handler.shutdown();
                            break;
                        }
                    }
                }
            })
            .map_err(|source| IpcError::Os {
                op: "spawn signal thread",
                source,
            })?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Stop capturing signals and wait for the thread to exit.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("[IPC] Signal thread panicked");
            }
        }
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::channel::LOCK_TIMEOUT;
    use crate::ipc::{Command, NamedSemaphore, Wait};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct FixedHandler {
        stopped: AtomicBool,
    }

    impl ControlHandler for FixedHandler {
        fn stats(&self) -> String {
            "Hubs: 7\n".to_string()
        }

        fn version(&self) -> String {
            "v9".to_string()
        }

        fn shutdown(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct Unlink(String);

    impl Drop for Unlink {
        fn drop(&mut self) {
            let _ = NamedSemaphore::unlink(&self.0);
        }
    }

    #[test]
    fn signals_answer_requests_and_stop() {
        let name = Unlink(format!("/tempest_signal_test_{}", std::process::id()));
        let server = Arc::new(ControlChannel::open(&name.0, Wait::Forever).unwrap());
        let handler = Arc::new(FixedHandler::default());
        let listener = SignalListener::spawn(Arc::clone(&server), Arc::clone(&handler)).unwrap();
        server.register().unwrap();

        let client = ControlChannel::open(&name.0, Wait::Timeout(LOCK_TIMEOUT)).unwrap();
        let timeout = Duration::from_secs(5);
        let stats = client.request(Command::Stats, timeout).unwrap();
        assert_eq!(stats.as_deref(), Some("Hubs: 7\n"));
        let version = client.request(Command::Version, timeout).unwrap();
        assert_eq!(version.as_deref(), Some("v9"));

        assert_eq!(client.request(Command::Stop, timeout).unwrap(), None);
        let deadline = Instant::now() + timeout;
        while !handler.stopped.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(handler.stopped.load(Ordering::SeqCst));

        listener.close();
        drop(client);
        drop(server);
    }
}
