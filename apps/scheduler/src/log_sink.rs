//! Per-execution append-only log files
//!
//! Each execution writes to
//! `<log_directory>/<YYYY-MM-DD>/<task_id>_<YYYY-MM-DD>_<HH-MM-SS-mmm>.log`.
//! Write failures are logged through `tracing` and otherwise ignored; a task
//! body never fails because its log could not be written.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{ExecutionRecord, LogContent};

/// How many suffixed names to try when a log path is already taken
const MAX_NAME_ATTEMPTS: u32 = 10;

/// Log file path for a run of `task_id` starting at `started_at`
pub fn log_file_path(task_dir: &Path, task_id: &str, started_at: DateTime<Utc>) -> PathBuf {
    let date = started_at.format("%Y-%m-%d").to_string();
    let time = started_at.format("%H-%M-%S-%3f");
    task_dir
        .join(&date)
        .join(format!("{}_{}_{}.log", task_id, date, time))
}

fn with_suffix(path: &Path, attempt: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}_{}.log", stem, attempt))
}

fn with_unique_suffix(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}_{}.log", stem, Uuid::new_v4().simple()))
}

async fn create_new(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create_new(true)
        .append(true)
        .open(path)
        .await
}

/// Append-only log for one execution
#[derive(Debug)]
pub struct LogSink {
    task_id: String,
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl LogSink {
    /// Create the dated directory and a fresh log file
    ///
    /// Never fails: if the file cannot be created the sink still reports the
    /// intended path but drops writes.
    pub async fn open(task_dir: &Path, task_id: &str, started_at: DateTime<Utc>) -> Self {
        let base = log_file_path(task_dir, task_id, started_at);

        if let Some(parent) = base.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                warn!(task_id = %task_id, path = %parent.display(), error = %e, "Failed to create log directory");
                return Self::detached(task_id, base);
            }
        }

        let mut path = base.clone();
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            match create_new(&path).await {
                Ok(file) => return Self::attached(task_id, path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    path = with_suffix(&base, attempt);
                }
                Err(e) => {
                    warn!(task_id = %task_id, path = %path.display(), error = %e, "Failed to create log file");
                    return Self::detached(task_id, path);
                }
            }
        }

        // Every counted suffix is taken; the recorded path must still be unique
        let path = with_unique_suffix(&base);
        warn!(task_id = %task_id, path = %path.display(), "Sequential log names exhausted");
        match create_new(&path).await {
            Ok(file) => Self::attached(task_id, path, file),
            Err(e) => {
                warn!(task_id = %task_id, path = %path.display(), error = %e, "Failed to create log file");
                Self::detached(task_id, path)
            }
        }
    }

    fn attached(task_id: &str, path: PathBuf, file: File) -> Self {
        Self {
            task_id: task_id.to_string(),
            path,
            file: Mutex::new(Some(file)),
        }
    }

    /// A sink that only mirrors lines to `tracing`
    pub fn detached(task_id: &str, path: PathBuf) -> Self {
        Self {
            task_id: task_id.to_string(),
            path,
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path as stored on the execution record
    pub fn path_string(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Append one timestamped line
    pub async fn write_log(&self, line: &str) {
        info!(task_id = %self.task_id, "{}", line);

        let mut guard = self.file.lock().await;
        let Some(file) = guard.as_mut() else {
            return;
        };

        let entry = format!("[{}] {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"), line);
        let written = match file.write_all(entry.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(task_id = %self.task_id, path = %self.path.display(), error = %e, "Log write failed, disabling file log");
            *guard = None;
        }
    }

    /// Flush and close the file; later writes only reach `tracing`
    pub async fn close(&self) {
        let mut guard = self.file.lock().await;
        if let Some(mut file) = guard.take() {
            if let Err(e) = file.sync_all().await {
                warn!(task_id = %self.task_id, error = %e, "Failed to sync log file");
            }
        }
    }
}

/// Read the log for an execution, degrading to a synthesized report
///
/// `record` is `None` when no execution with `execution_id` exists.
pub async fn read_log(execution_id: i64, record: Option<&ExecutionRecord>) -> LogContent {
    let Some(record) = record else {
        return LogContent {
            execution_id,
            log_file: None,
            content: format!("No execution record found for id {}", execution_id),
            synthesized: true,
        };
    };

    match fs::read_to_string(&record.log_file).await {
        Ok(content) => LogContent {
            execution_id,
            log_file: Some(record.log_file.clone()),
            content,
            synthesized: false,
        },
        Err(e) => LogContent {
            execution_id,
            log_file: Some(record.log_file.clone()),
            content: synthesize(record, &e.to_string()),
            synthesized: true,
        },
    }
}

fn synthesize(record: &ExecutionRecord, read_error: &str) -> String {
    let mut lines = vec![
        format!("Log file unavailable ({}): {}", read_error, record.log_file),
        format!("Task: {}", record.task_id),
        format!("Execution: {}", record.id),
        format!("Status: {:?}", record.status),
        format!("Started: {}", record.start_time.to_rfc3339()),
    ];
    if let Some(end) = record.end_time {
        lines.push(format!("Finished: {}", end.to_rfc3339()));
    }
    if let Some(result) = &record.result {
        lines.push(format!("Result: {}", result.summary()));
    }
    if let Some(error) = &record.error {
        lines.push(format!("Error: {}", error.message));
        if let Some(stack) = &error.stack {
            lines.push(stack.clone());
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionStatus, TaskFailure};
    use chrono::TimeZone;

    fn started() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 18, 9, 5, 7).unwrap() + chrono::Duration::milliseconds(42)
    }

    #[test]
    fn test_log_file_path_layout() {
        let path = log_file_path(Path::new("/var/log/encore/isrc-backfill"), "isrc-backfill", started());
        assert_eq!(
            path,
            PathBuf::from(
                "/var/log/encore/isrc-backfill/2024-08-18/isrc-backfill_2024-08-18_09-05-07-042.log"
            )
        );
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LogSink::open(dir.path(), "isrc-backfill", started()).await;
        sink.write_log("first line").await;
        sink.write_log("second line").await;
        sink.close().await;

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("first line"));
        assert!(lines[1].ends_with("second line"));
    }

    #[tokio::test]
    async fn test_colliding_names_get_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let first = LogSink::open(dir.path(), "upc-backfill", started()).await;
        let second = LogSink::open(dir.path(), "upc-backfill", started()).await;

        assert_ne!(first.path(), second.path());
        assert!(second.path_string().ends_with("09-05-07-042_1.log"));
    }

    #[tokio::test]
    async fn test_exhausted_suffixes_fall_back_to_unique_name() {
        let dir = tempfile::tempdir().unwrap();
        let base = log_file_path(dir.path(), "upc-backfill", started());
        std::fs::create_dir_all(base.parent().unwrap()).unwrap();
        let mut taken = vec![base.clone()];
        taken.extend((1..MAX_NAME_ATTEMPTS).map(|attempt| with_suffix(&base, attempt)));
        for path in &taken {
            std::fs::write(path, "earlier run\n").unwrap();
        }

        let sink = LogSink::open(dir.path(), "upc-backfill", started()).await;
        assert!(!taken.contains(&sink.path().to_path_buf()));
        assert_eq!(sink.path().parent(), base.parent());
        assert!(sink.path_string().ends_with(".log"));

        sink.write_log("fresh line").await;
        sink.close().await;
        let content = std::fs::read_to_string(sink.path()).unwrap();
        assert!(content.ends_with("fresh line\n"));
        for path in &taken {
            assert_eq!(std::fs::read_to_string(path).unwrap(), "earlier run\n");
        }

        let again = LogSink::open(dir.path(), "upc-backfill", started()).await;
        assert_ne!(again.path(), sink.path());
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "not a directory").unwrap();

        let sink = LogSink::open(&blocker, "isrc-backfill", started()).await;
        sink.write_log("goes nowhere").await;
        sink.close().await;

        assert!(sink.path().starts_with(&blocker));
        assert!(!sink.path().exists());
    }

    fn record(log_file: &str) -> ExecutionRecord {
        ExecutionRecord {
            id: 11,
            task_id: "isrc-backfill".to_string(),
            start_time: started(),
            end_time: Some(started()),
            status: ExecutionStatus::Failed,
            result: None,
            error: Some(TaskFailure::panic("catalog exploded")),
            log_file: log_file.to_string(),
        }
    }

    #[tokio::test]
    async fn test_read_log_missing_record() {
        let content = read_log(99, None).await;
        assert!(content.synthesized);
        assert!(content.log_file.is_none());
        assert!(content.content.contains("99"));
    }

    #[tokio::test]
    async fn test_read_log_missing_file_synthesizes() {
        let record = record("/nonexistent/encore/isrc.log");
        let content = read_log(record.id, Some(&record)).await;
        assert!(content.synthesized);
        assert!(content.content.contains("Status: Failed"));
        assert!(content.content.contains("Error: catalog exploded"));
    }

    #[tokio::test]
    async fn test_read_log_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        std::fs::write(&path, "hello\n").unwrap();

        let record = record(&path.to_string_lossy());
        let content = read_log(record.id, Some(&record)).await;
        assert!(!content.synthesized);
        assert_eq!(content.content, "hello\n");
    }
}
