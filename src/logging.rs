use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, NaiveDate};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

const LOG_FILE_PREFIX: &str = "knowledge-qa_";
const LOG_FILE_EXTENSION: &str = "log";
const LOG_RETENTION_DAYS: i64 = 7;
const DEFAULT_CONSOLE_FILTER: &str = "info";
const FILE_FILTER: &str = "info,knowledge_qa=debug";

/// Initialize console logging, plus a daily log file when `log_dir` is given.
///
/// The console level follows `RUST_LOG` and defaults to `info`. Failures to set up
/// the log file are reported on stderr and never stop the program.
#[inline]
pub fn init_logging(log_dir: Option<&Path>) {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_CONSOLE_FILTER));
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let today = Local::now().date_naive();
    let file_layer = log_dir.and_then(|dir| match open_log_file(dir, today) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(EnvFilter::new(FILE_FILTER)),
        ),
        Err(e) => {
            eprintln!("Failed to open log file in {}: {}", dir.display(), e);
            None
        }
    });

    // A subscriber may already be installed, e.g. by tests
    let _ = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let Some(dir) = log_dir {
        cleanup_old_logs(dir, today);
    }
}

fn open_log_file(log_dir: &Path, today: NaiveDate) -> std::io::Result<File> {
    fs::create_dir_all(log_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path(log_dir, today))
}

/// Path of the log file written on `date`
#[inline]
pub fn log_file_path(log_dir: &Path, date: NaiveDate) -> PathBuf {
    log_dir.join(format!(
        "{}{}.{}",
        LOG_FILE_PREFIX,
        date.format("%Y-%m-%d"),
        LOG_FILE_EXTENSION
    ))
}

/// Delete log files older than the retention window. Errors are silently ignored.
fn cleanup_old_logs(log_dir: &Path, today: NaiveDate) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(file_date) = log_file_date(&path) else {
            continue;
        };
        if today.signed_duration_since(file_date).num_days() >= LOG_RETENTION_DAYS {
            let _ = fs::remove_file(&path);
        }
    }
}

fn log_file_date(path: &Path) -> Option<NaiveDate> {
    if path.extension().and_then(|e| e.to_str()) != Some(LOG_FILE_EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let date = stem.strip_prefix(LOG_FILE_PREFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}
