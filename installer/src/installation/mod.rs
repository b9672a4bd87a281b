// Installation (one-shot procedure run after the last wizard step)
//
// The wizard only sees the `Installer` contract. The default implementation
// (`procedure::ProcedureInstaller`) records its progress in an install log that
// `status::InstallStatusReporter` serves to pollers.
//
// IMPORTANT:
// - Never log secrets (passwords, posted forms, connection URLs).
// - All I/O should be async.

pub mod install_log;
pub mod procedure;
pub mod status;

use crate::models::session::WizardSession;
use crate::utils::logging::{mask_sensitive, mask_url_credentials};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

/// Result of one install attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    succeeded: bool,
    log_filename: String,
}

impl InstallOutcome {
    pub fn new(succeeded: bool, log_filename: impl Into<String>) -> Self {
        Self {
            succeeded,
            log_filename: log_filename.into(),
        }
    }

    pub fn has_succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn log_filename(&self) -> &str {
        &self.log_filename
    }
}

#[async_trait]
pub trait Installer: Send + Sync {
    /// Run the installation with the finalized session.
    ///
    /// A procedure failure is an `Ok` outcome that has not succeeded. `Err` is
    /// reserved for faults that happen before any install log could be written.
    async fn install(&self, session: &WizardSession) -> Result<InstallOutcome>;
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u128,
}

fn mask_arg_for_log(arg: &str) -> String {
    let lower = arg.to_ascii_lowercase();
    if lower.contains("password")
        || lower.contains("pwd=")
        || lower.contains("secret")
        || lower.contains("token")
    {
        return "***".to_string();
    }

    if arg.contains("://") && arg.contains('@') {
        return mask_url_credentials(arg);
    }

    // Short flags and paths are useful in logs; only long opaque values get shortened.
    if arg.len() > 32 && !arg.contains('/') {
        return mask_sensitive(arg);
    }
    arg.to_string()
}

fn is_transient_exec_error(e: &anyhow::Error) -> bool {
    let msg = e.to_string().to_ascii_lowercase();
    msg.contains("timed out")
        || msg.contains("temporarily")
        || msg.contains("busy")
        || msg.contains("in use")
        || msg.contains("resource")
        || msg.contains("connection")
}

async fn run_cmd_with_timeout_once(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    timeout_dur: Duration,
    operation: &str,
) -> Result<CommandOutput> {
    let started = Instant::now();

    debug!(
        "[PHASE: installation] [STEP: cmd] Spawning (operation={}, program={}, args=[{}], timeout_ms={})",
        operation,
        program,
        args.iter().map(|a| mask_arg_for_log(a)).collect::<Vec<_>>().join(", "),
        timeout_dur.as_millis()
    );

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().with_context(|| {
        format!(
            "Failed to spawn command '{}' (operation={})",
            program, operation
        )
    })?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow::anyhow!("Failed to capture stdout (operation={})", operation))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("Failed to capture stderr (operation={})", operation))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await?;
        Ok::<String, std::io::Error>(String::from_utf8_lossy(&buf).to_string())
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf).await?;
        Ok::<String, std::io::Error>(String::from_utf8_lossy(&buf).to_string())
    });

    let status = match timeout(timeout_dur, child.wait()).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            return Err(anyhow::Error::new(e)).with_context(|| {
                format!(
                    "Command wait failed (operation={}, program={})",
                    operation, program
                )
            });
        }
        Err(_) => {
            warn!(
                "[PHASE: installation] [STEP: cmd] Timeout reached (operation={}, program={}, timeout_ms={}); killing process",
                operation,
                program,
                timeout_dur.as_millis()
            );
            if let Err(e) = child.kill().await {
                warn!(
                    "[PHASE: installation] [STEP: cmd] Failed to kill timed-out process (operation={}): {}",
                    operation, e
                );
            }
            // reap
            let _ = timeout(Duration::from_secs(5), child.wait()).await;

            return Err(anyhow::anyhow!(
                "Command timed out after {}ms (operation={}, program={})",
                timeout_dur.as_millis(),
                operation,
                program
            ));
        }
    };

    let stdout_str = stdout_task
        .await
        .context("stdout join failed")?
        .context("stdout read failed")?;
    let stderr_str = stderr_task
        .await
        .context("stderr join failed")?
        .context("stderr read failed")?;

    Ok(CommandOutput {
        exit_code: status.code(),
        stdout: stdout_str,
        stderr: stderr_str,
        duration_ms: started.elapsed().as_millis(),
    })
}

/// Run an external command with a timeout and up to 3 retries for transient failures.
///
/// Returns captured stdout/stderr even when exit code is non-zero (caller decides success).
pub async fn run_cmd_with_timeout(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    timeout_dur: Duration,
    operation: &str,
) -> Result<CommandOutput> {
    let started = Instant::now();
    info!(
        "[PHASE: installation] [STEP: cmd] Running (operation={}, program={}, args_count={}, timeout_ms={})",
        operation,
        program,
        args.len(),
        timeout_dur.as_millis()
    );

    let program_owned = program.to_string();
    let args_owned = args.to_vec();
    let envs_owned = envs.to_vec();
    let operation_owned = operation.to_string();

    let attempt = move || {
        let program = program_owned.clone();
        let args = args_owned.clone();
        let envs = envs_owned.clone();
        let op = operation_owned.clone();
        async move { run_cmd_with_timeout_once(&program, &args, &envs, timeout_dur, &op).await }
    };

    let retry_strategy = ExponentialBackoff::from_millis(200)
        .factor(2)
        .max_delay(Duration::from_secs(2))
        .take(3)
        .map(jitter);

    let result = RetryIf::spawn(retry_strategy, attempt, |e: &anyhow::Error| {
        let transient = is_transient_exec_error(e);
        if transient {
            warn!(
                "[PHASE: installation] [STEP: cmd] Transient command failure; will retry (operation={}, err={})",
                operation, e
            );
        }
        transient
    })
    .await;

    match &result {
        Ok(out) => info!(
            "[PHASE: installation] [STEP: cmd] Finished (operation={}, exit_code={:?}, duration_ms={})",
            operation,
            out.exit_code,
            started.elapsed().as_millis()
        ),
        Err(e) => error!(
            "[PHASE: installation] [STEP: cmd] Failed (operation={}, duration_ms={}, err={:#})",
            operation,
            started.elapsed().as_millis(),
            e
        ),
    }

    result
}
