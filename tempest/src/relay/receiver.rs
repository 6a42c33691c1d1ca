use super::{Relay, RelayError, Result};
use crate::config::OutputFormat;
use log::{debug, error, info};
use std::io::{self, ErrorKind, Write};
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// Bind the broadcast port on all interfaces.
pub fn bind(port: u16, timeout: Duration) -> Result<UdpSocket> {
    bind_to(("0.0.0.0", port), timeout).map_err(|e| match e {
        RelayError::Bind { source, .. } => RelayError::Bind { port, source },
        other => other,
    })
}

pub fn bind_to<A: ToSocketAddrs>(address: A, timeout: Duration) -> Result<UdpSocket> {
    let bind_error = |source| RelayError::Bind { port: 0, source };
    let socket = UdpSocket::bind(address).map_err(bind_error)?;
    socket.set_read_timeout(Some(timeout)).map_err(bind_error)?;
    Ok(socket)
}

/// Receive datagrams until the relay stops. The socket's read timeout bounds exit latency.
pub fn run(relay: &Relay, socket: UdpSocket) -> Result<()> {
    let config = relay.config();
    let echo = config.is_trace() && config.format == OutputFormat::Json;
    let mut buffer = vec![0u8; config.buffer_max.saturating_sub(1).max(1)];

    match socket.local_addr() {
        Ok(address) => info!("[RECEIVER] Listening on {}", address),
        Err(_) => info!("[RECEIVER] Listening"),
    }

    while !relay.is_stopping() {
        let (len, peer) = match socket.recv_from(&mut buffer) {
            Ok(received) => received,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(e) => {
                error!("[RECEIVER] Receive failed: {}", e);
                relay.stop();
                return Err(RelayError::Receive(e));
            }
        };

        let datagram = &buffer[..len];
        if echo {
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(datagram);
            let _ = stdout.write_all(b"\n");
            continue;
        }

        let applied = relay.ingest(datagram);
        debug!(
            "[RECEIVER] {} bytes from {}: {:?} x{}",
            len, peer, applied.kind, applied.count
        );
    }

    info!("[RECEIVER] Stopped");
    Ok(())
}
