// Secret encryption (encryption-at-rest for the written parameters file)
//
// - "is encrypted?" detection via the `ENCv1:` prefix
// - Authenticated encryption using AES-256-GCM
// - Lazy, file-backed master key stored next to the parameters file
//
// The platform reads the same key file to decrypt its credentials, so losing
// the key is fatal: unlike a cache, a key that cannot be persisted is an error.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{Context, Result};
use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

const ENC_PREFIX: &str = "ENCv1:";
const KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;

#[derive(Debug)]
pub struct SecretProtector {
    key_path: PathBuf,
    key: OnceCell<[u8; KEY_BYTES]>,
}

impl SecretProtector {
    pub fn new(key_path: PathBuf) -> Self {
        Self {
            key_path,
            key: OnceCell::new(),
        }
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    pub fn is_encrypted(&self, value: &str) -> bool {
        value.starts_with(ENC_PREFIX)
    }

    pub async fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        if self.is_encrypted(plaintext) {
            return Ok(plaintext.to_string());
        }

        let cipher = self.cipher().await?;

        let mut nonce_bytes = [0u8; NONCE_BYTES];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|_| anyhow::anyhow!("Failed to generate nonce"))?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| anyhow::anyhow!("Secret encryption failed"))?;

        // nonce || ciphertext (ciphertext includes the GCM tag)
        let mut blob = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);

        Ok(format!(
            "{}{}",
            ENC_PREFIX,
            base64::engine::general_purpose::STANDARD.encode(blob)
        ))
    }

    pub async fn decrypt(&self, value: &str) -> Result<String> {
        let Some(encoded) = value.strip_prefix(ENC_PREFIX) else {
            return Ok(value.to_string());
        };
        if encoded.is_empty() {
            return Ok(String::new());
        }

        let blob = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .context("Failed to base64-decode encrypted secret")?;
        if blob.len() < NONCE_BYTES {
            anyhow::bail!("Encrypted secret blob is too short");
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_BYTES);

        let plaintext = self
            .cipher()
            .await?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| anyhow::anyhow!("Secret decryption failed"))?;
        String::from_utf8(plaintext).context("Decrypted secret is not valid UTF-8")
    }

    async fn cipher(&self) -> Result<Aes256Gcm> {
        let key = self.get_or_init_key().await?;
        Aes256Gcm::new_from_slice(key)
            .map_err(|_| anyhow::anyhow!("Internal error: invalid AES-256 key length"))
    }

    async fn load_key(&self) -> Result<[u8; KEY_BYTES]> {
        let bytes = tokio::fs::read(&self.key_path)
            .await
            .with_context(|| format!("Failed to read secret key file: {:?}", self.key_path))?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(String::from_utf8_lossy(&bytes).trim())
            .context("Failed to decode secret key file (base64)")?;
        if decoded.len() != KEY_BYTES {
            anyhow::bail!("Secret key file has invalid length (expected {KEY_BYTES} bytes)");
        }
        let mut key = [0u8; KEY_BYTES];
        key.copy_from_slice(&decoded);
        Ok(key)
    }

    async fn get_or_init_key(&self) -> Result<&[u8; KEY_BYTES]> {
        self.key
            .get_or_try_init(|| async {
                if tokio::fs::try_exists(&self.key_path).await.unwrap_or(false) {
                    return self.load_key().await;
                }

                if let Some(parent) = self.key_path.parent() {
                    tokio::fs::create_dir_all(parent).await.with_context(|| {
                        format!("Failed to create secret key directory: {:?}", parent)
                    })?;
                }

                let mut key_bytes = [0u8; KEY_BYTES];
                SystemRandom::new()
                    .fill(&mut key_bytes)
                    .map_err(|_| anyhow::anyhow!("Failed to generate secret key"))?;
                let encoded = base64::engine::general_purpose::STANDARD.encode(key_bytes);

                let key_path = self.key_path.clone();
                let write_action = move || {
                    let key_path = key_path.clone();
                    let encoded = encoded.clone();
                    async move {
                        let mut opts = tokio::fs::OpenOptions::new();
                        opts.write(true).create_new(true);
                        #[cfg(unix)]
                        opts.mode(0o600);
                        let mut file = opts.open(&key_path).await?;
                        file.write_all(encoded.as_bytes()).await?;
                        file.flush().await?;
                        Ok::<(), std::io::Error>(())
                    }
                };

                let retry_strategy = ExponentialBackoff::from_millis(50)
                    .factor(2)
                    .max_delay(std::time::Duration::from_millis(750))
                    .take(3)
                    .map(jitter);

                match RetryIf::spawn(retry_strategy, write_action, is_transient_io_error).await {
                    Ok(()) => Ok(key_bytes),
                    // Lost a creation race: whoever won owns the key.
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                        self.load_key().await
                    }
                    Err(e) => Err(anyhow::Error::new(e).context(format!(
                        "Failed to persist secret key file: {:?}",
                        self.key_path
                    ))),
                }
            })
            .await
    }
}

fn is_transient_io_error(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::TimedOut
    )
}

/// Key file location for a given parameters file.
pub fn default_key_path(parameters_path: &Path) -> PathBuf {
    parameters_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("secrets")
        .join("parameters_master_key.b64")
}
