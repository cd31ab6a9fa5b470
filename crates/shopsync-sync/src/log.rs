//! # Sync Log
//!
//! Append-only text file for store operators, separate from tracing output.
//!
//! ```text
//! [2024-03-02 14:05:11] Sync started (manual)
//! [2024-03-02 14:05:12] Pulled products: 12 applied, 1 kept local
//! [2024-03-02 14:05:12] Sync completed (manual): pulled 12, pushed 4, ...
//! ```

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::{SyncError, SyncResult};

/// `tail` reads the file backwards in chunks of this size.
const TAIL_CHUNK: u64 = 8 * 1024;

#[derive(Debug)]
pub struct SyncLog {
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl SyncLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        SyncLog {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn format_line(message: &str) -> String {
        let flat = message.replace(['\r', '\n'], " ");
        format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), flat)
    }

    pub async fn append(&self, message: &str) -> SyncResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(log_err)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(log_err)?;
        file.write_all(Self::format_line(message).as_bytes())
            .await
            .map_err(log_err)?;
        file.flush().await.map_err(log_err)?;
        Ok(())
    }

    /// Last `n` lines, oldest first.
    ///
    /// Reads only as much of the end of the file as the lines need, so the
    /// cost does not grow with the log.
    pub async fn tail(&self, n: usize) -> SyncResult<Vec<String>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(log_err(e)),
        };
        let len = file.metadata().await.map_err(log_err)?.len();

        // n lines end in n newlines; one more marks where the first begins
        let mut pos = len;
        let mut buf: Vec<u8> = Vec::new();
        let mut newlines = 0usize;
        while pos > 0 && newlines <= n {
            let step = TAIL_CHUNK.min(pos);
            pos -= step;

            let mut chunk = vec![0u8; step as usize];
            file.seek(SeekFrom::Start(pos)).await.map_err(log_err)?;
            file.read_exact(&mut chunk).await.map_err(log_err)?;

            newlines += chunk.iter().filter(|b| **b == b'\n').count();
            chunk.extend_from_slice(&buf);
            buf = chunk;
        }

        let text = String::from_utf8_lossy(&buf);
        let mut lines: Vec<&str> = text.lines().collect();
        if pos > 0 && !lines.is_empty() {
            // Cut mid-line by the chunk boundary
            lines.remove(0);
        }
        let start = lines.len().saturating_sub(n);
        Ok(lines[start..].iter().map(|l| l.to_string()).collect())
    }
}

fn log_err(err: std::io::Error) -> SyncError {
    SyncError::LogFailed(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_tail() {
        let dir = tempfile::tempdir().unwrap();
        let log = SyncLog::new(Some(dir.path().join("logs").join("sync.log")));

        assert!(log.tail(5).await.unwrap().is_empty());

        for i in 1..=4 {
            log.append(&format!("entry {i}")).await.unwrap();
        }
        log.append("two\nlines").await.unwrap();

        let tail = log.tail(2).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail[0].ends_with("] entry 4"));
        assert!(tail[1].ends_with("] two lines"));
        assert_eq!(log.tail(100).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_tail_reads_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.log");
        let log = SyncLog::new(Some(path.clone()));

        // Several chunks' worth, with one line longer than a chunk near the end
        let mut contents = String::new();
        for i in 0..2_000 {
            contents.push_str(&format!("[2024-03-02 14:05:11] entry {i}\n"));
        }
        let long = "x".repeat(TAIL_CHUNK as usize + 100);
        contents.push_str(&format!("{long}\n"));
        contents.push_str("last\n");
        tokio::fs::write(&path, &contents).await.unwrap();

        let tail = log.tail(3).await.unwrap();
        assert_eq!(tail, vec!["[2024-03-02 14:05:11] entry 1999".to_string(), long, "last".to_string()]);

        let all = log.tail(10_000).await.unwrap();
        assert_eq!(all.len(), 2_002);
        assert_eq!(all[0], "[2024-03-02 14:05:11] entry 0");
        assert!(log.tail(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tail_without_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.log");
        tokio::fs::write(&path, "one\ntwo\nthree").await.unwrap();

        let log = SyncLog::new(Some(path));
        assert_eq!(log.tail(2).await.unwrap(), vec!["two".to_string(), "three".to_string()]);
    }

    #[test]
    fn test_line_format() {
        let line = SyncLog::format_line("hello");
        // [YYYY-MM-DD HH:MM:SS] hello
        assert_eq!(line.len(), 1 + 19 + 2 + 5 + 1);
        assert!(line.starts_with('['));
        assert_eq!(&line[20..22], "] ");
        assert!(line.ends_with("hello\n"));
    }

    #[tokio::test]
    async fn test_disabled_log_is_silent() {
        let log = SyncLog::disabled();
        log.append("ignored").await.unwrap();
        assert!(log.tail(10).await.unwrap().is_empty());
        assert!(log.path().is_none());
    }
}
