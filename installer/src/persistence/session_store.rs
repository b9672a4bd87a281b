// Transport-owned session storage
//
// The wizard session lives in memory during a request and is saved to a JSON
// file between requests. Install submission closes the store (no further
// writes), then invalidates it (file removed, a fresh session starts).
// Passwords are sealed with the secret protector on disk.

use crate::models::session::WizardSession;
use crate::security::secret_protector::SecretProtector;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait TransportSession: Send + Sync {
    /// Flush the session and stop accepting writes.
    async fn close(&self, session: &WizardSession) -> Result<()>;

    /// Discard the stored session and reopen an empty one.
    async fn invalidate(&self) -> Result<()>;
}

#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    protector: Arc<SecretProtector>,
    closed: AtomicBool,
}

impl FileSessionStore {
    pub fn new(path: PathBuf, protector: Arc<SecretProtector>) -> Self {
        Self {
            path,
            protector,
            closed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stored session, or `fresh` when nothing usable is stored.
    pub async fn load_or(&self, fresh: WizardSession) -> WizardSession {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return fresh,
            Err(e) => {
                warn!(
                    "[PHASE: wizard] [STEP: session] Session file unreadable ({:?}): {}; starting fresh",
                    self.path, e
                );
                return fresh;
            }
        };
        let sealed: WizardSession = match serde_json::from_str(&text) {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    "[PHASE: wizard] [STEP: session] Session file corrupt ({:?}): {}; starting fresh",
                    self.path, e
                );
                return fresh;
            }
        };
        match self.unseal(sealed).await {
            Ok(session) => {
                debug!(
                    "[PHASE: wizard] [STEP: session] Session restored from {:?}",
                    self.path
                );
                session
            }
            Err(e) => {
                warn!(
                    "[PHASE: wizard] [STEP: session] Session secrets unreadable ({:?}): {:#}; starting fresh",
                    self.path, e
                );
                fresh
            }
        }
    }

    /// Persist the session unless the store was closed.
    pub async fn save(&self, session: &WizardSession) -> Result<()> {
        if self.is_closed() {
            debug!("[PHASE: wizard] [STEP: session] Store closed; save skipped");
            return Ok(());
        }
        self.write(session).await
    }

    async fn seal(&self, session: &WizardSession) -> Result<WizardSession> {
        let mut sealed = session.clone();
        let database = sealed.database_settings_mut();
        database.password = self.protector.encrypt(&database.password).await?;

        let admin = sealed.first_admin_settings_mut();
        admin.password = self.protector.encrypt(&admin.password).await?;
        admin.password_confirmation = self
            .protector
            .encrypt(&admin.password_confirmation)
            .await?;

        let mailing = sealed.mailing_settings_mut();
        let mut options = mailing.transport_options().clone();
        if let Some(pw) = options.get_mut("password") {
            *pw = self.protector.encrypt(pw).await?;
        }
        mailing.set_transport_options(options);
        Ok(sealed)
    }

    async fn unseal(&self, mut session: WizardSession) -> Result<WizardSession> {
        let database = session.database_settings_mut();
        database.password = self.protector.decrypt(&database.password).await?;

        let admin = session.first_admin_settings_mut();
        admin.password = self.protector.decrypt(&admin.password).await?;
        admin.password_confirmation = self
            .protector
            .decrypt(&admin.password_confirmation)
            .await?;

        let mailing = session.mailing_settings_mut();
        let mut options = mailing.transport_options().clone();
        if let Some(pw) = options.get_mut("password") {
            *pw = self.protector.decrypt(pw).await?;
        }
        mailing.set_transport_options(options);
        Ok(session)
    }

    async fn write(&self, session: &WizardSession) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Session path has no parent: {:?}", self.path))?;
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create session directory {:?}", dir))?;

        let sealed = self.seal(session).await?;
        let json = serde_json::to_vec(&sealed).context("Failed to serialize session")?;

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Session path has no file name: {:?}", self.path))?;
        let tmp_path = dir.join(format!("{}.tmp", file_name.to_string_lossy()));

        let mut opts = tokio::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        opts.mode(0o600);
        let mut file = opts
            .open(&tmp_path)
            .await
            .with_context(|| format!("Failed to open {:?}", tmp_path))?;
        file.write_all(&json)
            .await
            .with_context(|| format!("Failed to write session file {:?}", tmp_path))?;
        file.flush()
            .await
            .with_context(|| format!("Failed to flush {:?}", tmp_path))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to move {:?} into place", tmp_path))
    }
}

#[async_trait]
impl TransportSession for FileSessionStore {
    async fn close(&self, session: &WizardSession) -> Result<()> {
        if !self.is_closed() {
            self.write(session).await?;
            self.closed.store(true, Ordering::SeqCst);
            info!("[PHASE: install] [STEP: session] Session closed before install");
        }
        Ok(())
    }

    async fn invalidate(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("Failed to remove session file {:?}", self.path));
            }
        }
        self.closed.store(false, Ordering::SeqCst);
        info!("[PHASE: install] [STEP: session] Session invalidated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::FieldMap;
    use crate::security::secret_protector::default_key_path;

    fn store_at(path: PathBuf) -> FileSessionStore {
        let protector = Arc::new(SecretProtector::new(default_key_path(&path)));
        FileSessionStore::new(path, protector)
    }

    #[tokio::test]
    async fn saved_session_is_restored() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store_at(tmp.path().join("var").join("session.json"));
        let mut session = WizardSession::new("fr", "BE");
        session.platform_settings_mut().name = "Campus".to_string();
        store.save(&session).await.expect("save");

        let restored = store.load_or(WizardSession::default()).await;
        assert_eq!(restored, session);
    }

    #[tokio::test]
    async fn corrupt_file_falls_back_to_fresh_session() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("session.json");
        std::fs::write(&path, "{not json").expect("seed");
        let store = store_at(path);
        let restored = store.load_or(WizardSession::new("en", "GB")).await;
        assert_eq!(restored.country(), "GB");
    }

    #[tokio::test]
    async fn closed_store_ignores_saves_until_invalidated() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = store_at(tmp.path().join("session.json"));
        let mut session = WizardSession::default();
        session.platform_settings_mut().name = "Before".to_string();
        store.close(&session).await.expect("close");
        assert!(store.is_closed());

        session.platform_settings_mut().name = "After".to_string();
        store.save(&session).await.expect("save is a no-op");
        let on_disk = store.load_or(WizardSession::default()).await;
        assert_eq!(on_disk.platform_settings().name, "Before");

        store.invalidate().await.expect("invalidate");
        assert!(!store.is_closed());
        assert!(!store.path().exists());
        store.invalidate().await.expect("second invalidate is harmless");
    }

    #[tokio::test]
    async fn passwords_are_sealed_on_disk() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("var").join("session.json");
        let store = store_at(path.clone());

        let mut session = WizardSession::new("en", "GB");
        session.database_settings_mut().password = "db-secret".to_string();
        let admin = session.first_admin_settings_mut();
        admin.password = "admin-secret".to_string();
        admin.password_confirmation = "admin-secret".to_string();
        session.mailing_settings_mut().set_transport("smtp");
        let mut options = FieldMap::new();
        options.insert("host".to_string(), "mail.example.org".to_string());
        options.insert("password".to_string(), "mail-secret".to_string());
        session.mailing_settings_mut().set_transport_options(options);
        store.save(&session).await.expect("save");

        let raw = std::fs::read_to_string(&path).expect("read raw");
        for secret in ["db-secret", "admin-secret", "mail-secret"] {
            assert!(!raw.contains(secret), "{} leaked:\n{}", secret, raw);
        }
        assert!(raw.contains("mail.example.org"));
        assert!(!path.with_file_name("session.json.tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let restored = store.load_or(WizardSession::default()).await;
        assert_eq!(restored, session);
    }

    #[tokio::test]
    async fn plaintext_session_from_older_file_still_loads() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("session.json");
        let mut session = WizardSession::new("fr", "FR");
        session.database_settings_mut().password = "legacy".to_string();
        std::fs::write(&path, serde_json::to_vec(&session).expect("json")).expect("seed");

        let store = store_at(path);
        let restored = store.load_or(WizardSession::default()).await;
        assert_eq!(restored.database_settings().password, "legacy");
    }
}
