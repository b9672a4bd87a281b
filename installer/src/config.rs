// Installer configuration
//
// Layering (later wins): built-in defaults, optional `installer.toml`,
// `PLATFORM_INSTALLER__*` environment variables. The file location can be
// overridden with `PLATFORM_INSTALLER_CONFIG`.

use crate::utils::path_resolver::default_app_dir;
use log::info;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "PLATFORM_INSTALLER_CONFIG";
const ENV_PREFIX: &str = "PLATFORM_INSTALLER";
const DEFAULT_CONFIG_FILE: &str = "installer.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load installer configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid installer configuration: {0}")]
    Invalid(String),
    #[error("Unable to resolve the application directory: {0}")]
    AppDir(String),
}

/// A command run by the installation procedure after the configuration is written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstallCommand {
    /// Display name, also used as the operation tag in logs
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    pub app_dir: Option<PathBuf>,
    pub logs_dir: Option<PathBuf>,
    pub parameters_path: Option<PathBuf>,
    pub session_path: Option<PathBuf>,
    /// Prefix under which the wizard routes are mounted
    pub base_path: String,
    /// Where a successful install redirects, relative to `base_path`
    pub success_path: String,
    pub database_check_timeout_secs: u64,
    pub mailing_check_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub default_language: String,
    pub default_country: String,
    pub post_install_commands: Vec<InstallCommand>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            app_dir: None,
            logs_dir: None,
            parameters_path: None,
            session_path: None,
            base_path: "/install".to_string(),
            success_path: "/../app".to_string(),
            database_check_timeout_secs: 15,
            mailing_check_timeout_secs: 15,
            command_timeout_secs: 300,
            default_language: "en".to_string(),
            default_country: "US".to_string(),
            post_install_commands: Vec::new(),
        }
    }
}

impl InstallerConfig {
    /// Load from the default locations (see module docs).
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path)
    }

    /// Load with `path` as the (optional) file layer.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let cfg: InstallerConfig = settings.try_deserialize()?;
        cfg.validate()?;
        info!(
            "[PHASE: initialization] [STEP: config] Configuration loaded (file={:?}, exists={}, base_path={})",
            path,
            path.exists(),
            cfg.base_path
        );
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_path.is_empty() && !self.base_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "base_path must be empty or start with '/' (got {:?})",
                self.base_path
            )));
        }
        if !crate::i18n::is_available_language(&self.default_language) {
            return Err(ConfigError::Invalid(format!(
                "default_language {:?} is not an available language",
                self.default_language
            )));
        }
        if let Some(cmd) = self
            .post_install_commands
            .iter()
            .find(|c| c.program.trim().is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "post-install command {:?} has no program",
                cmd.name
            )));
        }
        Ok(())
    }

    pub fn app_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.app_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_app_dir().map_err(|e| ConfigError::AppDir(e.to_string())),
        }
    }

    pub fn logs_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.logs_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.app_dir()?.join("logs")),
        }
    }

    pub fn parameters_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.parameters_path {
            Some(p) => Ok(p.clone()),
            None => Ok(self.app_dir()?.join("config").join("parameters.toml")),
        }
    }

    pub fn session_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.session_path {
            Some(p) => Ok(p.clone()),
            None => Ok(self.app_dir()?.join("var").join("wizard-session.json")),
        }
    }

    pub fn database_check_timeout(&self) -> Duration {
        Duration::from_secs(self.database_check_timeout_secs)
    }

    pub fn mailing_check_timeout(&self) -> Duration {
        Duration::from_secs(self.mailing_check_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let cfg = InstallerConfig::load_from(&tmp.path().join("absent.toml")).expect("defaults");
        assert_eq!(cfg.base_path, "/install");
        assert_eq!(cfg.database_check_timeout(), Duration::from_secs(15));
        assert!(cfg.post_install_commands.is_empty());
    }

    #[test]
    fn file_values_override_defaults_and_paths_derive_from_app_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("installer.toml");
        std::fs::write(
            &path,
            r#"
app_dir = "/srv/platform"
base_path = ""
mailing_check_timeout_secs = 3

[[post_install_commands]]
name = "warmup"
program = "/srv/platform/bin/console"
args = ["cache:warmup"]
"#,
        )
        .expect("write config");

        let cfg = InstallerConfig::load_from(&path).expect("load");
        assert_eq!(cfg.base_path, "");
        assert_eq!(cfg.mailing_check_timeout(), Duration::from_secs(3));
        assert_eq!(
            cfg.parameters_path().expect("parameters"),
            PathBuf::from("/srv/platform/config/parameters.toml")
        );
        assert_eq!(
            cfg.logs_dir().expect("logs"),
            PathBuf::from("/srv/platform/logs")
        );
        assert_eq!(cfg.post_install_commands.len(), 1);
        assert_eq!(cfg.post_install_commands[0].args, vec!["cache:warmup"]);
    }

    #[test]
    fn relative_base_path_is_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("installer.toml");
        std::fs::write(&path, "base_path = \"install\"\n").expect("write config");
        let err = InstallerConfig::load_from(&path).expect_err("relative base path");
        assert!(matches!(err, ConfigError::Invalid(_)), "{}", err);
    }

    #[test]
    fn unknown_default_language_is_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("installer.toml");
        std::fs::write(&path, "default_language = \"xx\"\n").expect("write config");
        assert!(InstallerConfig::load_from(&path).is_err());
    }
}
