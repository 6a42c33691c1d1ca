use super::{format, Relay, Result, Submitter};
use log::{debug, error, info};

/// Relay snapshots every interval, or sooner when the receiver flags pending work.
pub fn run(relay: &Relay, mut submitter: Box<dyn Submitter>) -> Result<()> {
    let config = relay.config();
    let interval = config.interval();
    info!("[TRANSMITTER] Relaying every {:?}", interval);

    loop {
        let payloads = {
            let mut state = match relay.wait_for_work(interval) {
                Some(state) => state,
                None => break,
            };
            match format::build(&mut state, config.format) {
                Ok(payloads) => payloads,
                Err(e) => {
                    drop(state);
                    error!("[TRANSMITTER] Failed to encode payloads: {}", e);
                    relay.stop();
                    return Err(e);
                }
            }
        };
        debug!("[TRANSMITTER] {} payload(s) due", payloads.len());

        for payload in &payloads {
            if relay.is_stopping() {
                break;
            }
            if let Err(e) = submitter.submit(payload) {
                error!("[TRANSMITTER] {}", e);
                relay.stop();
                return Err(e);
            }
        }
    }

    info!("[TRANSMITTER] Stopped");
    Ok(())
}
