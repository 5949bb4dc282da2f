//! Verbose log file capture: when `-v` is set, debug lines are written to
//! both stderr (via `env_logger`) and a plain-text file the `diag` command
//! can fold into its report.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

static VERBOSE_LOG: OnceLock<Mutex<Option<VerboseLog>>> = OnceLock::new();

struct VerboseLog {
    path: PathBuf,
    file: File,
}

/// Creates `<git-common-dir>/gitcuttle-logs/verbose.log`, truncating any
/// previous contents. Best-effort: failure (no repo, unwritable dir) just
/// means the `diag` command won't have a log section to attach.
pub fn init(git_dir: &std::path::Path) {
    let mutex = VERBOSE_LOG.get_or_init(|| Mutex::new(None));
    let Ok(mut guard) = mutex.lock() else { return };

    let log_dir = git_dir.join("gitcuttle-logs");
    if std::fs::create_dir_all(&log_dir).is_err() {
        return;
    }
    let path = log_dir.join("verbose.log");
    let Ok(file) = OpenOptions::new().write(true).create(true).truncate(true).open(&path) else {
        return;
    };
    *guard = Some(VerboseLog { path, file });
}

/// Appends one already-formatted log line. Write errors are swallowed —
/// logging must never break the command it's observing.
pub fn write_line(line: &str) {
    if let Some(mutex) = VERBOSE_LOG.get() {
        if let Ok(mut guard) = mutex.lock() {
            if let Some(log) = guard.as_mut() {
                let _ = writeln!(log.file, "{line}");
                let _ = log.file.flush();
            }
        }
    }
}

pub fn log_file_path() -> Option<PathBuf> {
    VERBOSE_LOG.get().and_then(|mutex| mutex.lock().ok().and_then(|guard| guard.as_ref().map(|log| log.path.clone())))
}
