extern crate tempest_relay;

#[path = "tempest_modules/cli.rs"]
mod cli;
#[path = "tempest_modules/handler.rs"]
mod handler;

use clap::Parser;
use cli::{Cli, Invocation};
use log::info;
use tempest_relay::logging;

fn main() {
    let code = run();
    std::process::exit(code);
}

fn run() -> i32 {
    // Load or ignore .env file
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let invocation = match cli.invocation() {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("tempest: {}", e);
            return e.exit_code();
        }
    };

    let level = match &invocation {
        Invocation::Relay(config) => config.log_level,
        Invocation::Control(_) => cli.log_level.unwrap_or(3),
    };
    logging::init_logger(logging::level_filter(level));
    logging::init_crash_logger();

    let dsn = std::env::var(logging::SENTRY_DSN_VAR).ok();
    if logging::init_sentry(dsn.as_deref()) {
        info!("[MAIN] Sentry monitoring enabled");
    }

    let code = match invocation {
        Invocation::Relay(config) => handler::run_relay(config),
        Invocation::Control(command) => handler::run_control(command),
    };

    logging::shutdown_sentry();
    code
}
