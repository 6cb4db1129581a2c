//! Process-wide tracing setup.
//!
//! Everything goes to `artisthub.log` in the app data dir so field reports can
//! ship the file. Stderr is kept for desktop runs; iOS additionally logs to
//! the unified log and Android to logcat.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const LOG_FILE: &str = "artisthub.log";

pub fn init_logging(data_dir: &str) {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| init_logging_inner(data_dir));
}

fn init_logging_inner(data_dir: &str) {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match open_log_file(data_dir) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file))
                .with_filter(filter()),
        ),
        Err(e) => {
            eprintln!("[artisthub] log file unavailable: {e}");
            None
        }
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let registry = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer);

    #[cfg(target_os = "ios")]
    let registry = registry.with(
        tracing_oslog::OsLogger::new("com.artisthub.app", "core").with_filter(filter()),
    );

    #[cfg(target_os = "android")]
    let registry = registry.with(paranoid_android::layer("artisthub").with_filter(filter()));

    // Another subscriber may already be installed (tests, host embedding); keep it.
    if registry.try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

fn open_log_file(data_dir: &str) -> std::io::Result<std::fs::File> {
    let dir = Path::new(data_dir);
    std::fs::create_dir_all(dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(LOG_FILE))
}
