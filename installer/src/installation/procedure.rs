// Default installation procedure
//
// Steps, each appended to the install log as it happens:
//   1. parameters file check
//   2. database connectivity (retried)
//   3. configured post-install commands
//   4. installation marker
// The first failing step ends the run with INSTALL FAILED.

use super::install_log::InstallLog;
use super::{run_cmd_with_timeout, InstallOutcome, Installer};
use crate::checkers::database::describe_target;
use crate::checkers::DatabaseChecker;
use crate::config::InstallCommand;
use crate::models::session::WizardSession;
use crate::persistence::writer::read_parameters;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use uuid::Uuid;

/// Environment variable pointing post-install commands at the written parameters.
pub const PARAMETERS_ENV: &str = "PLATFORM_INSTALLER_PARAMETERS";
pub const MARKER_FILE: &str = "installed.lock";

pub struct ProcedureInstaller {
    log_dir: PathBuf,
    parameters_path: PathBuf,
    app_dir: PathBuf,
    database_checker: Arc<dyn DatabaseChecker>,
    database_timeout: Duration,
    commands: Vec<InstallCommand>,
    command_timeout: Duration,
}

impl ProcedureInstaller {
    pub fn new(
        log_dir: PathBuf,
        parameters_path: PathBuf,
        app_dir: PathBuf,
        database_checker: Arc<dyn DatabaseChecker>,
    ) -> Self {
        Self {
            log_dir,
            parameters_path,
            app_dir,
            database_checker,
            database_timeout: Duration::from_secs(15),
            commands: Vec::new(),
            command_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_commands(mut self, commands: Vec<InstallCommand>, timeout: Duration) -> Self {
        self.commands = commands;
        self.command_timeout = timeout;
        self
    }

    pub fn with_database_timeout(mut self, timeout: Duration) -> Self {
        self.database_timeout = timeout;
        self
    }

    async fn check_parameters(&self, log: &mut InstallLog) -> Result<()> {
        log.line(&format!(
            "[1/4] Checking parameters file {}",
            self.parameters_path.display()
        ))
        .await?;
        let doc = read_parameters(&self.parameters_path).await?;
        log.line(&format!(
            "      parameters ok (database={}, mail transport={})",
            doc.database.engine(),
            doc.mailing.transport()
        ))
        .await
    }

    async fn check_database(&self, log: &mut InstallLog, session: &WizardSession) -> Result<()> {
        let settings = session.database_settings();
        log.line(&format!(
            "[2/4] Connecting to database {}",
            describe_target(settings)
        ))
        .await?;

        let retry_strategy = ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(2))
            .take(2)
            .map(jitter);

        let attempt = || async {
            match timeout(
                self.database_timeout,
                self.database_checker.connect_to_database(settings),
            )
            .await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(failure)) => {
                    warn!(
                        "[PHASE: installation] [STEP: database] Attempt failed: {}",
                        failure.internal_details
                    );
                    Err(failure.user_message)
                }
                Err(_) => Err(format!(
                    "Database connection timed out after {}s.",
                    self.database_timeout.as_secs()
                )),
            }
        };

        Retry::spawn(retry_strategy, attempt)
            .await
            .map_err(|msg| anyhow::anyhow!("Database check failed: {}", msg))?;
        log.line("      database reachable").await
    }

    async fn run_commands(&self, log: &mut InstallLog) -> Result<()> {
        log.line(&format!(
            "[3/4] Running post-install commands ({})",
            self.commands.len()
        ))
        .await?;
        let envs = vec![(
            PARAMETERS_ENV.to_string(),
            self.parameters_path.to_string_lossy().to_string(),
        )];

        for cmd in &self.commands {
            log.line(&format!("      -> {}", cmd.name)).await?;
            let out = run_cmd_with_timeout(
                &cmd.program,
                &cmd.args,
                &envs,
                self.command_timeout,
                &cmd.name,
            )
            .await
            .with_context(|| format!("Command '{}' could not run", cmd.name))?;

            log.block("stdout", &out.stdout).await?;
            log.block("stderr", &out.stderr).await?;
            if out.exit_code != Some(0) {
                anyhow::bail!(
                    "Command '{}' exited with {:?} after {}ms",
                    cmd.name,
                    out.exit_code,
                    out.duration_ms
                );
            }
            log.line(&format!("      {} ok ({}ms)", cmd.name, out.duration_ms))
                .await?;
        }
        Ok(())
    }

    async fn write_marker(&self, log: &mut InstallLog, correlation_id: &Uuid) -> Result<()> {
        let marker = self.app_dir.join(MARKER_FILE);
        log.line(&format!("[4/4] Writing installation marker {}", marker.display()))
            .await?;
        tokio::fs::create_dir_all(&self.app_dir)
            .await
            .with_context(|| format!("Failed to create {:?}", self.app_dir))?;
        let body = format!(
            "installed_at={}\ncorrelation_id={}\ninstall_log={}\n",
            chrono::Utc::now().to_rfc3339(),
            correlation_id,
            log.filename()
        );
        tokio::fs::write(&marker, body)
            .await
            .with_context(|| format!("Failed to write {:?}", marker))
    }

    async fn run_steps(
        &self,
        log: &mut InstallLog,
        session: &WizardSession,
        correlation_id: &Uuid,
    ) -> Result<()> {
        self.check_parameters(log).await?;
        self.check_database(log, session).await?;
        self.run_commands(log).await?;
        self.write_marker(log, correlation_id).await
    }
}

#[async_trait]
impl Installer for ProcedureInstaller {
    async fn install(&self, session: &WizardSession) -> Result<InstallOutcome> {
        let started = Instant::now();
        let mut log = InstallLog::create(&self.log_dir).await?;
        let correlation_id = Uuid::new_v4();

        info!(
            "[PHASE: installation] [STEP: start] Install started (log={}, correlation_id={})",
            log.filename(),
            correlation_id
        );
        log.line(&format!(
            "Installation started (correlation_id={}, language={}, country={})",
            correlation_id,
            session.install_language(),
            session.country()
        ))
        .await?;

        let succeeded = match self.run_steps(&mut log, session, &correlation_id).await {
            Ok(()) => match log.line("INSTALL SUCCEEDED").await {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        "[PHASE: installation] [STEP: finish] Could not record success in {}: {:#}",
                        log.filename(),
                        e
                    );
                    false
                }
            },
            Err(e) => {
                error!(
                    "[PHASE: installation] [STEP: failed] Install failed (log={}, correlation_id={}): {:#}",
                    log.filename(),
                    correlation_id,
                    e
                );
                for line in [format!("ERROR: {:#}", e), "INSTALL FAILED".to_string()] {
                    if let Err(write_err) = log.line(&line).await {
                        warn!(
                            "[PHASE: installation] [STEP: failed] Could not append to install log {}: {:#}",
                            log.filename(),
                            write_err
                        );
                    }
                }
                false
            }
        };

        info!(
            "[PHASE: installation] [STEP: finish] Install finished (succeeded={}, duration_ms={})",
            succeeded,
            started.elapsed().as_millis()
        );
        Ok(InstallOutcome::new(succeeded, log.filename()))
    }
}
