// Install log records
//
// One `install-<unix-seconds>.log` per attempt. Lines are appended and flushed
// immediately so status pollers see progress while the procedure runs.

use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

pub const LOG_PREFIX: &str = "install-";
pub const LOG_SUFFIX: &str = ".log";
/// How far the timestamp is bumped before giving up on a free name.
const MAX_NAME_ATTEMPTS: u64 = 64;

pub fn log_filename(timestamp: impl std::fmt::Display) -> String {
    format!("{}{}{}", LOG_PREFIX, timestamp, LOG_SUFFIX)
}

/// Timestamp of a log file name, if it follows `install-<digits>.log`.
pub fn parse_log_filename(name: &str) -> Option<&str> {
    let digits = name.strip_prefix(LOG_PREFIX)?.strip_suffix(LOG_SUFFIX)?;
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}

pub struct InstallLog {
    path: PathBuf,
    filename: String,
    file: File,
}

impl InstallLog {
    /// Create a fresh log in `log_dir`, named after the current time.
    pub async fn create(log_dir: &Path) -> Result<Self> {
        Self::create_at(log_dir, chrono::Utc::now().timestamp().max(0) as u64).await
    }

    /// Create a fresh log starting at `timestamp`, bumping it until the name is free.
    pub async fn create_at(log_dir: &Path, timestamp: u64) -> Result<Self> {
        tokio::fs::create_dir_all(log_dir)
            .await
            .with_context(|| format!("Failed to create install log directory: {:?}", log_dir))?;

        for ts in timestamp..timestamp + MAX_NAME_ATTEMPTS {
            let filename = log_filename(ts);
            let path = log_dir.join(&filename);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    debug!(
                        "[PHASE: installation] [STEP: install_log] Created {:?}",
                        path
                    );
                    return Ok(Self {
                        path,
                        filename,
                        file,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(anyhow::Error::new(e))
                        .with_context(|| format!("Failed to create install log {:?}", path));
                }
            }
        }
        anyhow::bail!(
            "No free install log name in {:?} after {} attempts",
            log_dir,
            MAX_NAME_ATTEMPTS
        )
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line and flush it.
    pub async fn line(&mut self, message: &str) -> Result<()> {
        let stamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
        let text = format!("[{}] {}\n", stamp, message);
        self.file
            .write_all(text.as_bytes())
            .await
            .with_context(|| format!("Failed to append to {:?}", self.path))?;
        self.file
            .flush()
            .await
            .with_context(|| format!("Failed to flush {:?}", self.path))?;
        Ok(())
    }

    /// Append a block of captured output, one indented line per source line.
    pub async fn block(&mut self, label: &str, text: &str) -> Result<()> {
        let trimmed = text.trim_end();
        if trimmed.is_empty() {
            return Ok(());
        }
        let mut out = format!("    {}:\n", label);
        for l in trimmed.lines() {
            out.push_str("      ");
            out.push_str(l);
            out.push('\n');
        }
        self.file.write_all(out.as_bytes()).await?;
        self.file.flush().await?;
        Ok(())
    }
}

/// Write a failure log for a fault that happened before the installer ran
/// (for example the configuration file could not be written).
pub async fn record_setup_fault(log_dir: &Path, reason: &str) -> Result<String> {
    let mut log = InstallLog::create(log_dir).await?;
    log.line("Installation aborted before the procedure started").await?;
    log.line(&format!("SETUP I/O FAULT: {}", reason)).await?;
    log.line("INSTALL FAILED").await?;
    Ok(log.filename().to_string())
}
