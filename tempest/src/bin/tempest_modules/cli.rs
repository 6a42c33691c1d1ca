use clap::Parser;
use std::path::PathBuf;
use tempest_relay::config::{
    collector_url, OutputFormat, RelayConfig, DEFAULT_HTTP_PATH, DEFAULT_HTTP_PORT,
};
use tempest_relay::ipc::Command;
use tempest_relay::RelayError;

const ECOWITT_INTERVAL: &str = "300";

#[derive(Parser, Debug)]
#[command(
    name = "tempest",
    about = "Relay WeatherFlow Tempest UDP broadcasts to an HTTP collector",
    disable_version_flag = true
)]
pub struct Cli {
    /// Collector host name or IP address
    #[arg(short = 'a', long, conflicts_with_all = ["url", "terminal"])]
    pub address: Option<String>,

    /// Collector URL path
    #[arg(short = 'x', long, default_value = DEFAULT_HTTP_PATH)]
    pub path: String,

    /// Collector TCP port
    #[arg(short = 'p', long, default_value_t = DEFAULT_HTTP_PORT)]
    pub port: u16,

    /// Full collector URL instead of --address, --path and --port
    #[arg(short = 'u', long, conflicts_with = "terminal")]
    pub url: Option<String>,

    /// Print to the terminal instead of posting to a collector
    #[arg(short = 't', long)]
    pub terminal: bool,

    /// Output format: json, rest or ecowitt
    #[arg(short = 'f', long)]
    pub format: Option<OutputFormat>,

    /// Ecowitt format, relayed every SECS seconds (60-3600)
    #[arg(
        short = 'e',
        long,
        value_name = "SECS",
        num_args = 0..=1,
        default_missing_value = ECOWITT_INTERVAL
    )]
    pub ecowitt: Option<u64>,

    /// Relay interval in seconds (60-3600)
    #[arg(short = 'i', long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Log level: 1 everything, 2 info, 3 warnings and errors, 4 errors only
    #[arg(short = 'l', long = "log", value_name = "LEVEL")]
    pub log_level: Option<u8>,

    /// UDP port the hub broadcasts on
    #[arg(long, value_name = "PORT")]
    pub udp_port: Option<u16>,

    /// TOML configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Stop the running relay
    #[arg(short = 's', long, conflicts_with_all = ["stats", "version"])]
    pub stop: bool,

    /// Print statistics of the running relay
    #[arg(long, conflicts_with = "version")]
    pub stats: bool,

    /// Print the version of the running relay
    #[arg(short = 'v', long)]
    pub version: bool,
}

#[derive(Debug)]
pub enum Invocation {
    Relay(RelayConfig),
    Control(Command),
}

impl Cli {
    pub fn invocation(&self) -> Result<Invocation, RelayError> {
        if let Some(command) = self.control_command() {
            return Ok(Invocation::Control(command));
        }

        let mut config = match &self.config {
            Some(path) => RelayConfig::from_file(path)?,
            None => RelayConfig::default(),
        };

        if let Some(url) = &self.url {
            config.url = Some(url.clone());
        } else if let Some(address) = &self.address {
            config.url = Some(collector_url(address, self.port, &self.path));
        }
        if self.terminal {
            config.url = None;
        } else if config.url.is_none() {
            return Err(RelayError::Config(
                "nothing to do: give --address, --url, --terminal or a control command".into(),
            ));
        }

        if let Some(secs) = self.ecowitt {
            config.format = OutputFormat::Ecowitt;
            config.interval_secs = secs;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(secs) = self.interval {
            config.interval_secs = secs;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(port) = self.udp_port {
            config.port = port;
        }

        config.validate()?;
        Ok(Invocation::Relay(config))
    }

    fn control_command(&self) -> Option<Command> {
        if self.stop {
            Some(Command::Stop)
        } else if self.stats {
            Some(Command::Stats)
        } else if self.version {
            Some(Command::Version)
        } else {
            None
        }
    }
}
