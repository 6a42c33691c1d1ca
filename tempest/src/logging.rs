use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Environment variable holding the optional Sentry DSN.
pub const SENTRY_DSN_VAR: &str = "TEMPEST_SENTRY_DSN";

static CRASH_LOG_PATH: OnceCell<PathBuf> = OnceCell::new();
static SENTRY_GUARD: Mutex<Option<sentry::ClientInitGuard>> = Mutex::new(None);

/// Map the 1..=4 verbosity scale of the command line onto a log filter.
pub fn level_filter(level: u8) -> LevelFilter {
    match level {
        0 | 1 => LevelFilter::Debug,
        2 => LevelFilter::Info,
        3 => LevelFilter::Warn,
        _ => LevelFilter::Error,
    }
}

/// Initialize env_logger. `RUST_LOG` takes precedence over `level`.
pub fn init_logger(level: LevelFilter) {
    let mut builder = env_logger::Builder::from_default_env();

    if std::env::var("RUST_LOG").is_err() {
        builder.filter_level(level);
    }

    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] [{}] {}: {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    let _ = builder.try_init();
}

/// Initialize Sentry monitoring. Disabled when no DSN is given.
pub fn init_sentry(dsn: Option<&str>) -> bool {
    let dsn = match dsn {
        Some(d) if !d.is_empty() => d,
        _ => {
            info!("[SENTRY] No DSN provided - Sentry disabled");
            return false;
        }
    };

    let guard = sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            send_default_pii: false,
            ..Default::default()
        },
    ));

    if guard.is_enabled() {
        *SENTRY_GUARD.lock().unwrap_or_else(|e| e.into_inner()) = Some(guard);
        info!("[SENTRY] Initialized");
        true
    } else {
        info!("[SENTRY] Failed to initialize");
        false
    }
}

pub fn is_sentry_enabled() -> bool {
    let guard = SENTRY_GUARD.lock().unwrap_or_else(|e| e.into_inner());
    guard.as_ref().map_or(false, |g| g.is_enabled())
}

/// Flush pending events and end the session.
pub fn shutdown_sentry() {
    let guard = SENTRY_GUARD.lock().unwrap_or_else(|e| e.into_inner()).take();
    if let Some(guard) = guard {
        drop(guard);
        info!("[SENTRY] Shutdown complete");
    }
}

/// Report an error that stops the relay.
pub fn capture_critical_error(context: &str, error: &str) {
    if is_sentry_enabled() {
        sentry::with_scope(
            |scope| {
                scope.set_tag("context", context);
                scope.set_level(Some(sentry::Level::Fatal));
            },
            || {
                sentry::capture_message(&format!("{}: {}", context, error), sentry::Level::Fatal);
            },
        );
    }

    let message = format!(
        "\n===== CRITICAL ERROR =====\nTimestamp: {}\nContext: {}\nError: {}\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        context,
        error
    );
    if let Err(e) = write_crash_log(&message) {
        error!("[CRASH LOGGER] Failed to write critical error: {}", e);
    }
}

/// Install a panic hook writing reports to `<data_local_dir>/tempest-relay/crash.log`.
pub fn init_crash_logger() {
    let log_dir = dirs::data_local_dir()
        .map(|dir| dir.join("tempest-relay"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = fs::create_dir_all(&log_dir);

    let log_path = log_dir.join("crash.log");
    let _ = CRASH_LOG_PATH.set(log_path.clone());

    std::panic::set_hook(Box::new(|panic_info| {
        let crash_msg = format_panic_message(panic_info);

        if is_sentry_enabled() {
            sentry::capture_message(&crash_msg, sentry::Level::Fatal);
        }
        if let Err(e) = write_crash_log(&crash_msg) {
            error!("[CRASH LOGGER] Failed to write crash log: {}", e);
        }
        error!("{}", crash_msg);
    }));

    info!("[CRASH LOGGER] Initialized - Log: {:?}", log_path);
}

pub fn crash_log_path() -> Option<&'static Path> {
    CRASH_LOG_PATH.get().map(PathBuf::as_path)
}

fn format_panic_message(panic_info: &std::panic::PanicHookInfo) -> String {
    let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic payload".to_string()
    };

    let location = panic_info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "Unknown location".to_string());

    format!(
        "\n===== PANIC =====\nTimestamp: {}\nLocation: {}\nMessage: {}\nThread: {}\n\nBacktrace:\n{}\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        location,
        payload,
        std::thread::current().name().unwrap_or("unnamed"),
        std::backtrace::Backtrace::capture()
    )
}

fn write_crash_log(message: &str) -> std::io::Result<()> {
    if let Some(path) = CRASH_LOG_PATH.get() {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", message)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_scale() {
        assert_eq!(level_filter(1), LevelFilter::Debug);
        assert_eq!(level_filter(2), LevelFilter::Info);
        assert_eq!(level_filter(3), LevelFilter::Warn);
        assert_eq!(level_filter(4), LevelFilter::Error);
    }

    #[test]
    fn sentry_disabled_without_dsn() {
        assert!(!init_sentry(None));
        assert!(!init_sentry(Some("")));
        assert!(!is_sentry_enabled());
    }
}
