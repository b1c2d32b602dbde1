use std::path::{Path, PathBuf};
use std::sync::Mutex;

use once_cell::sync::{Lazy, OnceCell};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

static ACTIVE_LOG_FILE: OnceCell<Option<PathBuf>> = OnceCell::new();
// Dropping the guard stops the writer thread.
static FILE_GUARD: Lazy<Mutex<Option<WorkerGuard>>> = Lazy::new(|| Mutex::new(None));

/// Initialise logging. `debug` enables the `debug` level and lets `RUST_LOG`
/// override it; otherwise `info` is forced.
///
/// With `log_file` set, events are appended to that file instead of stderr.
/// Only the first call in a process installs a subscriber.
pub fn init(debug: bool, log_file: Option<PathBuf>) {
    let level = if debug { "debug" } else { "info" };
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    } else {
        EnvFilter::new(level)
    };

    ACTIVE_LOG_FILE.get_or_init(|| {
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let target = log_file.as_deref().and_then(split_log_path);
        match target {
            Some((dir, name)) => {
                let appender = tracing_appender::rolling::never(dir, name);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let installed = builder
                    .with_ansi(false)
                    .with_writer(writer)
                    .try_init()
                    .is_ok();
                if installed {
                    if let Ok(mut slot) = FILE_GUARD.lock() {
                        *slot = Some(guard);
                    }
                }
                installed.then_some(log_file).flatten()
            }
            None => {
                let _ = builder.with_writer(std::io::stderr).try_init();
                None
            }
        }
    });
}

/// File the installed subscriber writes to, if any.
pub fn active_log_file() -> Option<PathBuf> {
    ACTIVE_LOG_FILE.get().cloned().flatten()
}

fn split_log_path(path: &Path) -> Option<(PathBuf, PathBuf)> {
    let name = path.file_name()?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Some((dir, PathBuf::from(name)))
}
