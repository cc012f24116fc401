//! Path resolution for sumactl
//!
//! # Environment Variables
//!
//! - `SUMACTL_CONFIG_DIR` - Override config directory (e.g., `/etc/sumactl`)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `SUMACTL_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/sumactl` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\sumactl`
//!    - macOS/Linux: `~/.config/sumactl`
//!
//! Session tokens live next to the config, one directory per server:
//! `<config dir>/<server fqdn>/session`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "SUMACTL_CONFIG_DIR";

/// Name of the config file inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Name of the session file inside a server directory
pub const SESSION_FILE: &str = "session";

/// Get the sumactl config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("sumactl");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join("sumactl");
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("sumactl");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Default config file path (`<config dir>/config.toml`)
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Session file for one server, stored beside the given config file.
pub fn session_file(config_file: &Path, fqdn: &str) -> PathBuf {
    config_file
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(fqdn)
        .join(SESSION_FILE)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Run a closure with an env var set, restoring it afterwards.
    ///
    /// # Safety
    /// Uses unsafe env::set_var/remove_var; only sound while no other thread
    /// reads the environment.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/sumactl", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/sumactl"));
            assert_eq!(
                config_file().unwrap(),
                PathBuf::from("/custom/sumactl/config.toml")
            );
        });

        // same test: both cases touch the same env var
        let home = dirs::home_dir().unwrap();
        let expected = home.join("ops").join("sumactl-tilde-test");
        with_env_var(ENV_CONFIG_DIR, "~/ops/sumactl-tilde-test", || {
            assert_eq!(config_dir().unwrap(), expected);
        });
    }

    #[test]
    fn test_session_file_beside_config() {
        let path = session_file(Path::new("/etc/sumactl/config.toml"), "suma.example.com");
        assert_eq!(
            path,
            PathBuf::from("/etc/sumactl/suma.example.com/session")
        );
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_with_env_var() {
        with_env_var("SUMACTL_TEST_VAR", "fleet", || {
            assert_eq!(
                expand("/srv/$SUMACTL_TEST_VAR/hosts.csv"),
                PathBuf::from("/srv/fleet/hosts.csv")
            );
        });
    }
}
