// Install status reporting for pollers
//
// Reads are lock-free: whatever bytes are flushed at read time are returned,
// and a trailing partial UTF-8 sequence is replaced rather than rejected.

use super::install_log::{log_filename, parse_log_filename};
use log::{debug, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallStatus {
    pub timestamp: String,
    pub content: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("No install logs found")]
    NoInstallLogs,
    #[error("Install log {filename} could not be read: {source}")]
    Unreadable {
        filename: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid install timestamp {0:?}")]
    InvalidTimestamp(String),
    #[error("Install log directory {dir:?} could not be read: {source}")]
    LogDirUnreadable {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct InstallStatusReporter {
    log_dir: PathBuf,
}

impl InstallStatusReporter {
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Content of the requested install log, or of the most recently modified one.
    pub async fn status(&self, timestamp: Option<&str>) -> Result<InstallStatus, StatusError> {
        let timestamp = match timestamp {
            Some(ts) => {
                if ts.is_empty() || !ts.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(StatusError::InvalidTimestamp(ts.to_string()));
                }
                ts.to_string()
            }
            None => self.latest_timestamp().await?,
        };

        let filename = log_filename(&timestamp);
        let bytes = tokio::fs::read(self.log_dir.join(&filename))
            .await
            .map_err(|source| StatusError::Unreadable {
                filename: filename.clone(),
                source,
            })?;
        debug!(
            "[PHASE: installation] [STEP: status] Served {} ({} bytes)",
            filename,
            bytes.len()
        );
        Ok(InstallStatus {
            timestamp,
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    async fn latest_timestamp(&self) -> Result<String, StatusError> {
        let mut entries = match tokio::fs::read_dir(&self.log_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "[PHASE: installation] [STEP: status] Log directory missing ({:?})",
                    self.log_dir
                );
                return Err(StatusError::NoInstallLogs);
            }
            Err(source) => {
                warn!(
                    "[PHASE: installation] [STEP: status] Log directory not readable ({:?}): {}",
                    self.log_dir, source
                );
                return Err(StatusError::LogDirUnreadable {
                    dir: self.log_dir.clone(),
                    source,
                });
            }
        };

        // Ordered by mtime, then numeric timestamp (length of the zero-stripped digits first)
        let mut best: Option<(SystemTime, usize, String, String)> = None;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    warn!(
                        "[PHASE: installation] [STEP: status] Directory scan interrupted: {}",
                        source
                    );
                    return Err(StatusError::LogDirUnreadable {
                        dir: self.log_dir.clone(),
                        source,
                    });
                }
            };
            let name = entry.file_name();
            let Some(digits) = name.to_str().and_then(parse_log_filename) else {
                continue;
            };
            let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
                continue;
            };
            let significant = digits.trim_start_matches('0').to_string();
            let candidate = (modified, significant.len(), significant, digits.to_string());
            if best.as_ref().map_or(true, |b| candidate > *b) {
                best = Some(candidate);
            }
        }

        best.map(|(_, _, _, digits)| digits)
            .ok_or(StatusError::NoInstallLogs)
    }

    /// Content of a failed-install log; absence is not an error.
    pub async fn read_failed_log(&self, filename: &str) -> Option<String> {
        parse_log_filename(filename)?;
        match tokio::fs::read(self.log_dir.join(filename)).await {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                debug!(
                    "[PHASE: installation] [STEP: failed_log] {} not readable: {}",
                    filename, e
                );
                None
            }
        }
    }
}
