use anyhow::Result;
use std::path::PathBuf;

const APP_DIR_NAME: &str = "platform-installer";

/// Resolve deployment folder (absolute path)
pub fn resolve_deployment_folder() -> Result<PathBuf> {
    // Prefer the folder where the binary is running from (works in dev and deployed)
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(dir) = exe_path.parent() {
            return Ok(dir.to_path_buf());
        }
    }

    Ok(std::env::current_dir()?)
}

/// Default application directory when none is configured.
///
/// Per-user data directory first (`~/.local/share/platform-installer` on Linux),
/// then the deployment folder.
pub fn default_app_dir() -> Result<PathBuf> {
    if let Some(data) = dirs::data_local_dir() {
        return Ok(data.join(APP_DIR_NAME));
    }
    Ok(resolve_deployment_folder()?.join(APP_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_folder_is_absolute() {
        let dir = resolve_deployment_folder().expect("deployment folder");
        assert!(dir.is_absolute(), "{:?}", dir);
    }

    #[test]
    fn default_app_dir_ends_with_app_name() {
        let dir = default_app_dir().expect("app dir");
        assert!(dir.ends_with(APP_DIR_NAME), "{:?}", dir);
    }
}
