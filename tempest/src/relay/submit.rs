use super::{Payload, RelayError, Result};
use log::debug;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::io::{self, Write};
use std::time::Duration;

/// Destination for encoded payloads.
pub trait Submitter: Send {
    fn submit(&mut self, payload: &Payload) -> Result<()>;
}

/// POSTs each payload to the collector.
pub struct HttpSubmitter {
    client: Client,
    url: String,
}

impl HttpSubmitter {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tempest-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Submit {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl Submitter for HttpSubmitter {
    fn submit(&mut self, payload: &Payload) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, payload.content_type)
            .body(payload.body.clone())
            .send()
            .map_err(|e| RelayError::Submit {
                url: self.url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::HttpStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        debug!("[TRANSMITTER] Posted {} bytes: {}", payload.body.len(), status);
        Ok(())
    }
}

/// Prints payloads, one per line, when no collector is configured.
#[derive(Debug, Default)]
pub struct StdoutSubmitter;

impl Submitter for StdoutSubmitter {
    fn submit(&mut self, payload: &Payload) -> Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", payload.body).map_err(RelayError::Output)?;
        stdout.flush().map_err(RelayError::Output)
    }
}
