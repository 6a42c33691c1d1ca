use log::{error, info};
use std::sync::Arc;
use tempest_relay::ipc::channel::{LOCK_TIMEOUT, REPLY_TIMEOUT};
use tempest_relay::ipc::{Command, ControlChannel, SignalListener, Wait, CHANNEL_NAME};
use tempest_relay::logging;
use tempest_relay::relay::{HttpSubmitter, Relay, StdoutSubmitter, Submitter};
use tempest_relay::RelayConfig;

/// Run the relay as the registered server until stopped. Returns the process exit code.
pub fn run_relay(config: RelayConfig) -> i32 {
    let channel = match ControlChannel::open(CHANNEL_NAME, Wait::Forever) {
        Ok(channel) => Arc::new(channel),
        Err(e) => {
            error!("[MAIN] Failed to open control channel: {}", e);
            return e.exit_code();
        }
    };

    let submitter: Box<dyn Submitter> = match &config.url {
        Some(url) => match HttpSubmitter::new(url, config.http_timeout()) {
            Ok(submitter) => Box::new(submitter),
            Err(e) => {
                error!("[MAIN] {}", e);
                return e.exit_code();
            }
        },
        None => Box::new(StdoutSubmitter),
    };

    let relay = Arc::new(Relay::new(config));
    let listener = match SignalListener::spawn(Arc::clone(&channel), Arc::clone(&relay)) {
        Ok(listener) => listener,
        Err(e) => {
            error!("[MAIN] {}", e);
            return e.exit_code();
        }
    };

    if let Err(e) = channel.register() {
        listener.close();
        error!("[MAIN] Cannot start: {}", e);
        eprintln!("tempest: {}", e);
        return e.exit_code();
    }

    info!("[MAIN] Tempest relay {} running", tempest_relay::get_version());
    let result = relay.run(submitter);
    listener.close();

    match result {
        Ok(()) => {
            info!("[MAIN] Exiting");
            0
        }
        Err(e) => {
            error!("[MAIN] Relay failed: {}", e);
            logging::capture_critical_error("relay", &e.to_string());
            e.exit_code()
        }
    }
}

/// Send a control command to the running relay and print its reply.
pub fn run_control(command: Command) -> i32 {
    let channel = match ControlChannel::open(CHANNEL_NAME, Wait::Timeout(LOCK_TIMEOUT)) {
        Ok(channel) => channel,
        Err(e) => {
            eprintln!("tempest: {}", e);
            return e.exit_code();
        }
    };

    match channel.request(command, REPLY_TIMEOUT) {
        Ok(Some(reply)) => {
            if reply.ends_with('\n') {
                print!("{}", reply);
            } else {
                println!("{}", reply);
            }
            0
        }
        Ok(None) => {
            println!("Stop requested");
            0
        }
        Err(e) => {
            eprintln!("tempest: {}", e);
            e.exit_code()
        }
    }
}
