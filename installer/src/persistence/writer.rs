// Durable configuration output
//
// The finalized session is written once, on install submission, as a TOML
// parameters file the platform reads at boot. Secrets are sealed with
// `SecretProtector`; the file is replaced atomically (temp file + rename).

use crate::models::session::WizardSession;
use crate::models::settings::{AdminSettings, DatabaseSettings, MailingSettings, PlatformSettings};
use crate::security::secret_protector::SecretProtector;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait ParametersWriter: Send + Sync {
    /// Persist the whole session to the permanent configuration store.
    async fn write_parameters(&self, session: &WizardSession) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerSection {
    pub generated_at: String,
    pub install_language: String,
    pub country: String,
}

/// On-disk layout of the parameters file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParametersDocument {
    pub installer: InstallerSection,
    pub database: DatabaseSettings,
    pub platform: PlatformSettings,
    pub first_admin: AdminSettings,
    pub mailing: MailingSettings,
}

pub struct TomlParametersWriter {
    path: PathBuf,
    protector: Arc<SecretProtector>,
}

impl TomlParametersWriter {
    pub fn new(path: PathBuf, protector: Arc<SecretProtector>) -> Self {
        Self { path, protector }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn build_document(&self, session: &WizardSession) -> Result<ParametersDocument> {
        let mut database = session.database_settings().clone();
        database.password = self
            .protector
            .encrypt(&database.password)
            .await
            .context("Failed to seal database password")?;

        let mut first_admin = session.first_admin_settings().clone();
        first_admin.password = self
            .protector
            .encrypt(&first_admin.password)
            .await
            .context("Failed to seal administrator password")?;
        first_admin.password_confirmation = self
            .protector
            .encrypt(&first_admin.password_confirmation)
            .await
            .context("Failed to seal administrator password")?;

        let mut mailing = session.mailing_settings().clone();
        let mut options = mailing.transport_options().clone();
        if let Some(pw) = options.get_mut("password") {
            *pw = self
                .protector
                .encrypt(pw)
                .await
                .context("Failed to seal mail transport password")?;
        }
        mailing.set_transport_options(options);

        Ok(ParametersDocument {
            installer: InstallerSection {
                generated_at: chrono::Utc::now().to_rfc3339(),
                install_language: session.install_language().to_string(),
                country: session.country().to_string(),
            },
            database,
            platform: session.platform_settings().clone(),
            first_admin,
            mailing,
        })
    }
}

/// Read a parameters file back (secrets stay sealed).
pub async fn read_parameters(path: &Path) -> Result<ParametersDocument> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read parameters file {:?}", path))?;
    toml::from_str(&text).with_context(|| format!("Parameters file {:?} is not valid", path))
}

async fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Parameters path has no parent: {:?}", path))?;
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create configuration directory {:?}", dir))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Parameters path has no file name: {:?}", path))?;
    let tmp_path = dir.join(format!("{}.tmp", file_name.to_string_lossy()));

    let mut opts = tokio::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(0o600);
    let mut file = opts
        .open(&tmp_path)
        .await
        .with_context(|| format!("Failed to open {:?}", tmp_path))?;
    file.write_all(contents)
        .await
        .with_context(|| format!("Failed to write {:?}", tmp_path))?;
    file.sync_all()
        .await
        .with_context(|| format!("Failed to sync {:?}", tmp_path))?;
    drop(file);

    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to move {:?} into place", tmp_path))?;
    Ok(())
}

#[async_trait]
impl ParametersWriter for TomlParametersWriter {
    async fn write_parameters(&self, session: &WizardSession) -> Result<()> {
        let document = self.build_document(session).await?;
        let text = toml::to_string_pretty(&document).context("Failed to serialize parameters")?;
        write_atomically(&self.path, text.as_bytes()).await?;
        info!(
            "[PHASE: install] [STEP: write_parameters] Parameters written (path={:?}, transport={})",
            self.path,
            document.mailing.transport()
        );
        Ok(())
    }
}
