// Fixed-layout control record shared between the running relay and CLI clients.

use super::{IpcError, Result};
use libc::pid_t;

pub const BUFFER_LEN: usize = 2048;

/// Command field value when no request is outstanding.
pub const NO_COMMAND: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stop = 0,
    Stats = 1,
    Version = 2,
}

impl Command {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Command::Stop),
            1 => Some(Command::Stats),
            2 => Some(Command::Version),
            _ => None,
        }
    }

    /// Signal that delivers this command to the server.
    pub fn signal(self) -> libc::c_int {
        match self {
            Command::Stop => libc::SIGTERM,
            Command::Stats | Command::Version => libc::SIGUSR1,
        }
    }
}

/// Record living in the shared segment. A pid of 0 means the slot is free.
#[repr(C)]
pub struct ControlRecord {
    pub server_pid: pid_t,
    pub client_pid: pid_t,
    pub command: i32,
    pub error: i32,
    /// Nonzero once the server has answered the outstanding request.
    pub answered: i32,
    pub buffer: [u8; BUFFER_LEN],
}

impl ControlRecord {
    pub fn new() -> Self {
        Self {
            server_pid: 0,
            client_pid: 0,
            command: NO_COMMAND,
            error: 0,
            answered: 0,
            buffer: [0; BUFFER_LEN],
        }
    }

    /// Claim the server slot for `pid`.
    pub fn register_server(&mut self, pid: pid_t) -> Result<()> {
        if self.server_pid != 0 {
            return Err(IpcError::AlreadyRunning {
                pid: self.server_pid,
            });
        }
        self.server_pid = pid;
        Ok(())
    }

    /// Free the server slot if `pid` holds it.
    pub fn release_server(&mut self, pid: pid_t) -> bool {
        if self.server_pid == pid {
            self.server_pid = 0;
            true
        } else {
            false
        }
    }

    /// Write a client request and return the server pid to signal.
    pub fn post_request(&mut self, client: pid_t, command: Command) -> Result<pid_t> {
        if self.server_pid == 0 {
            return Err(IpcError::NotRunning);
        }
        self.client_pid = client;
        self.command = command.code();
        self.error = 0;
        self.answered = 0;
        self.buffer[0] = 0;
        Ok(self.server_pid)
    }

    /// Answer the outstanding request and return the client pid to signal, or 0 when there
    /// is nothing left to answer.
    pub fn respond<F>(&mut self, stats: F, version: &str) -> pid_t
    where
        F: FnOnce() -> String,
    {
        if self.command == NO_COMMAND || self.answered != 0 {
            return 0;
        }
        match Command::from_code(self.command) {
            Some(Command::Stats) => {
                self.write_text(&stats());
                self.error = 0;
            }
            Some(Command::Version) => {
                self.write_text(version);
                self.error = 0;
            }
            _ => {
                self.buffer[0] = 0;
                self.error = libc::EINVAL;
            }
        }
        self.answered = 1;
        self.client_pid
    }

    /// Read the server's answer and clear the request fields. `None` while unanswered.
    pub fn take_response(&mut self) -> Result<Option<String>> {
        if self.answered == 0 {
            return Ok(None);
        }
        let result = match (self.error, Command::from_code(self.command)) {
            (0, Some(Command::Stats | Command::Version)) => Ok(self.read_text()),
            (0, _) => Err(IpcError::InvalidCommand),
            (code, _) => Err(IpcError::from_code(code)),
        };

        self.client_pid = 0;
        self.command = NO_COMMAND;
        self.error = 0;
        self.answered = 0;
        self.buffer[0] = 0;
        result.map(Some)
    }

    /// Store `text` NUL-terminated, truncated on a character boundary.
    pub fn write_text(&mut self, text: &str) {
        let mut end = text.len().min(BUFFER_LEN - 1);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        self.buffer[..end].copy_from_slice(&text.as_bytes()[..end]);
        self.buffer[end] = 0;
    }

    pub fn read_text(&self) -> String {
        let end = self
            .buffer
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(BUFFER_LEN);
        String::from_utf8_lossy(&self.buffer[..end]).into_owned()
    }
}

impl Default for ControlRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_server_is_rejected_with_first_pid() {
        let mut record = ControlRecord::new();
        record.register_server(100).unwrap();
        match record.register_server(200) {
            Err(IpcError::AlreadyRunning { pid }) => assert_eq!(pid, 100),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(!record.release_server(200));
        assert!(record.release_server(100));
        assert!(record.register_server(200).is_ok());
    }

    #[test]
    fn request_without_server_is_not_running() {
        let mut record = ControlRecord::new();
        assert!(matches!(
            record.post_request(7, Command::Stats),
            Err(IpcError::NotRunning)
        ));
    }

    #[test]
    fn stats_round_trip() {
        let mut record = ControlRecord::new();
        record.register_server(100).unwrap();
        assert_eq!(record.post_request(7, Command::Stats).unwrap(), 100);
        assert_eq!(record.take_response().unwrap(), None);
        assert_eq!(record.respond(|| "Hubs: 1\n".to_string(), "v1"), 7);
        assert_eq!(record.take_response().unwrap().as_deref(), Some("Hubs: 1\n"));

        assert_eq!(record.command, NO_COMMAND);
        assert_eq!(record.client_pid, 0);
        assert_eq!(record.server_pid, 100);
    }

    #[test]
    fn version_round_trip() {
        let mut record = ControlRecord::new();
        record.register_server(100).unwrap();
        record.post_request(7, Command::Version).unwrap();
        record.respond(|| panic!("stats not requested"), "v1.0.37");
        assert_eq!(record.take_response().unwrap().as_deref(), Some("v1.0.37"));
    }

    #[test]
    fn request_is_answered_once() {
        let mut record = ControlRecord::new();
        record.register_server(100).unwrap();
        assert_eq!(record.respond(String::new, "v1"), 0);

        record.post_request(7, Command::Stats).unwrap();
        assert_eq!(record.respond(|| "first".to_string(), "v1"), 7);
        assert_eq!(record.respond(|| "second".to_string(), "v1"), 0);
        assert_eq!(record.take_response().unwrap().as_deref(), Some("first"));
        assert_eq!(record.respond(|| "late".to_string(), "v1"), 0);
        assert_eq!(record.error, 0);
    }

    #[test]
    fn unknown_command_is_invalid() {
        let mut record = ControlRecord::new();
        record.register_server(100).unwrap();
        record.client_pid = 7;
        record.command = 42;
        record.respond(String::new, "v1");
        assert_eq!(record.error, libc::EINVAL);
        assert!(matches!(record.take_response(), Err(IpcError::InvalidCommand)));
    }

    #[test]
    fn long_text_is_truncated_on_char_boundary() {
        let mut record = ControlRecord::new();
        let text = "é".repeat(BUFFER_LEN);
        record.write_text(&text);
        let read = record.read_text();
        assert!(read.len() < BUFFER_LEN);
        assert!(read.chars().all(|c| c == 'é'));
    }

    #[test]
    fn command_signals() {
        assert_eq!(Command::Stop.signal(), libc::SIGTERM);
        assert_eq!(Command::Stats.signal(), libc::SIGUSR1);
        assert_eq!(Command::from_code(Command::Version.code()), Some(Command::Version));
        assert_eq!(Command::from_code(NO_COMMAND), None);
    }
}
