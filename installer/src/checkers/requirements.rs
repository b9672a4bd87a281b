// Environment audit for the requirements step
//
// Every probe is best-effort: a probe that cannot be evaluated is reported as
// not passed, never as an error.

use super::{RequirementChecker, RequirementLevel, SettingCategory, SettingItem};
use crate::installation::run_cmd_with_timeout;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use tokio::time::Duration;

const MIN_FREE_BYTES: u64 = 1024 * 1024 * 1024;
const MIN_AVAILABLE_MEMORY_BYTES: u64 = 512 * 1024 * 1024;
const DF_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SettingChecker {
    app_dir: PathBuf,
    logs_dir: PathBuf,
    config_dir: PathBuf,
}

impl SettingChecker {
    pub fn new(app_dir: PathBuf, logs_dir: PathBuf, config_dir: PathBuf) -> Self {
        Self {
            app_dir,
            logs_dir,
            config_dir,
        }
    }
}

fn item(description: impl Into<String>, level: RequirementLevel, passed: bool) -> SettingItem {
    SettingItem {
        description: description.into(),
        level,
        passed,
    }
}

fn is_supported_os() -> bool {
    cfg!(any(target_os = "linux", target_os = "windows", target_os = "macos"))
}

/// Create the directory if needed and prove a file can be written into it.
fn probe_writable(dir: &Path) -> bool {
    let attempt = || -> Result<()> {
        std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
        let probe = dir.join(format!(".write-probe-{}", uuid::Uuid::new_v4()));
        std::fs::write(&probe, b"probe").with_context(|| format!("write {:?}", probe))?;
        std::fs::remove_file(&probe).with_context(|| format!("remove {:?}", probe))?;
        Ok(())
    };
    match attempt() {
        Ok(()) => true,
        Err(e) => {
            warn!(
                "[PHASE: wizard] [STEP: requirements] Directory not writable: {:#}",
                e
            );
            false
        }
    }
}

/// Parse the "Available" column (KB) of `df -Pk` output.
pub fn parse_df_available_bytes(stdout: &str) -> Option<u64> {
    let data = stdout.lines().nth(1)?;
    let cols: Vec<&str> = data.split_whitespace().collect();
    let avail_kb: u64 = cols.get(3)?.parse().ok()?;
    Some(avail_kb.saturating_mul(1024))
}

/// Parse `MemAvailable` from `/proc/meminfo`.
pub fn parse_meminfo_available_bytes(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|l| l.starts_with("MemAvailable:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb.saturating_mul(1024))
}

/// `df` needs an existing path; walk up until one exists.
fn existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| p.exists())
}

async fn free_space_bytes(path: &Path) -> Result<u64> {
    let target = existing_ancestor(path)
        .ok_or_else(|| anyhow::anyhow!("No existing ancestor for {:?}", path))?;
    let out = run_cmd_with_timeout(
        "df",
        &["-Pk".to_string(), target.to_string_lossy().to_string()],
        &[],
        DF_TIMEOUT,
        "requirements_df",
    )
    .await?;
    if out.exit_code != Some(0) {
        anyhow::bail!("df failed (exit_code={:?})", out.exit_code);
    }
    parse_df_available_bytes(&out.stdout).ok_or_else(|| anyhow::anyhow!("df output parse error"))
}

async fn available_memory_bytes() -> Result<u64> {
    let meminfo = tokio::fs::read_to_string("/proc/meminfo")
        .await
        .context("read /proc/meminfo")?;
    parse_meminfo_available_bytes(&meminfo)
        .ok_or_else(|| anyhow::anyhow!("MemAvailable missing from /proc/meminfo"))
}

#[async_trait]
impl RequirementChecker for SettingChecker {
    async fn setting_categories(&self) -> Vec<SettingCategory> {
        info!("[PHASE: wizard] [STEP: requirements] Auditing environment");

        let os = SettingCategory {
            name: "Operating system".to_string(),
            items: vec![
                item(
                    format!("Supported operating system ({})", std::env::consts::OS),
                    RequirementLevel::Required,
                    is_supported_os(),
                ),
                item(
                    "64-bit architecture",
                    RequirementLevel::Recommended,
                    cfg!(target_pointer_width = "64"),
                ),
            ],
        };

        let mut fs_items = Vec::new();
        for (label, dir) in [
            ("Application directory", &self.app_dir),
            ("Log directory", &self.logs_dir),
            ("Configuration directory", &self.config_dir),
        ] {
            fs_items.push(item(
                format!("{} is writable ({})", label, dir.display()),
                RequirementLevel::Required,
                probe_writable(dir),
            ));
        }
        let free_ok = match free_space_bytes(&self.app_dir).await {
            Ok(bytes) => {
                debug!(
                    "[PHASE: wizard] [STEP: requirements] Free space (bytes={})",
                    bytes
                );
                bytes >= MIN_FREE_BYTES
            }
            Err(e) => {
                warn!(
                    "[PHASE: wizard] [STEP: requirements] Free space probe failed: {:#}",
                    e
                );
                false
            }
        };
        fs_items.push(item(
            "At least 1 GB of free disk space",
            RequirementLevel::Recommended,
            free_ok,
        ));

        let memory_ok = match available_memory_bytes().await {
            Ok(bytes) => bytes >= MIN_AVAILABLE_MEMORY_BYTES,
            Err(e) => {
                warn!(
                    "[PHASE: wizard] [STEP: requirements] Memory probe failed: {:#}",
                    e
                );
                false
            }
        };

        let categories = vec![
            os,
            SettingCategory {
                name: "Filesystem".to_string(),
                items: fs_items,
            },
            SettingCategory {
                name: "Memory".to_string(),
                items: vec![item(
                    "At least 512 MB of available memory",
                    RequirementLevel::Recommended,
                    memory_ok,
                )],
            },
            SettingCategory {
                name: "Tools".to_string(),
                items: vec![item(
                    "sendmail binary on PATH",
                    RequirementLevel::Recommended,
                    which::which("sendmail").is_ok(),
                )],
            },
        ];

        let failed = categories
            .iter()
            .flat_map(|c| c.items.iter())
            .filter(|i| !i.passed)
            .count();
        info!(
            "[PHASE: wizard] [STEP: requirements] Audit finished (failed_items={})",
            failed
        );
        categories
    }
}
