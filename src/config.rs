//! Config file loading for sumactl
//!
//! The config lives at `<config dir>/config.toml` (see [`crate::paths`]) or
//! wherever `-c/--config` points. A missing file is replaced by a template
//! and the command stops so the operator can fill it in.

use crate::paths;
use anyhow::{Context, Result, bail};
use fleetkit::{Credentials, HttpSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Schema
// ============================================================================

/// The sumactl configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the HTTP API, e.g. `https://suma.example.com/rhn/manager/api`
    pub api_url: String,

    /// Server host name; names the directory holding the session file
    pub fqdn: String,

    /// Verify the server's TLS certificate
    #[serde(default)]
    pub verify_tls: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Login credentials. Anything left out is prompted for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                api_url: "https://localhost/rhn/manager/api".to_string(),
                fqdn: "localhost.localdomain".to_string(),
                verify_tls: false,
                timeout_secs: default_timeout_secs(),
            },
            credentials: CredentialsConfig {
                username: Some("admin".to_string()),
                password: Some("admin".to_string()),
            },
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// A loaded config and the file it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
}

impl LoadedConfig {
    /// Load from `-c` or the default location.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => paths::config_file()?,
        };
        let config = Config::load_or_create(&path)?;
        Ok(Self { config, path })
    }

    /// Where the session token for the configured server is kept.
    pub fn session_file(&self) -> PathBuf {
        paths::session_file(&self.path, &self.config.server.fqdn)
    }
}

impl Config {
    /// Load a config file, writing a template and failing when it is missing.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::error!(
                "Configuration file {} does not exist. Creating a new one.",
                path.display()
            );
            let written = Self::default().save(path)?;
            bail!(
                "Created {}. Edit it with your credentials and server information, then run again.",
                written.display()
            );
        }
        Self::load(path)
    }

    /// Load and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
        config.validate()?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save the config, creating private parent directories.
    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            create_private_dir(dir)?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Could not write config file: {}", path.display()))?;
        Ok(path.to_path_buf())
    }

    fn validate(&self) -> Result<()> {
        if self.server.api_url.trim().is_empty() {
            bail!("server.api_url must not be empty");
        }
        if self.server.fqdn.trim().is_empty() {
            bail!("server.fqdn must not be empty");
        }
        if self.server.timeout_secs == 0 {
            bail!("server.timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Transport settings for the fleet client.
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            api_url: self.server.api_url.trim_end_matches('/').to_string(),
            verify_tls: self.server.verify_tls,
            timeout: Duration::from_secs(self.server.timeout_secs),
        }
    }

    /// Credentials from the config, prompting for whatever is missing.
    pub fn credentials(&self) -> Result<Credentials> {
        let username = match &self.credentials.username {
            Some(u) if !u.is_empty() => u.clone(),
            _ => dialoguer::Input::<String>::new()
                .with_prompt("Enter your username")
                .interact_text()
                .context("Could not read username")?,
        };
        let password = match &self.credentials.password {
            Some(p) => p.clone(),
            None => dialoguer::Password::new()
                .with_prompt(format!("Enter your password for username {username}"))
                .interact()
                .context("Could not read password")?,
        };
        Ok(Credentials::new(username, password))
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if dir.exists() {
        return Ok(());
    }
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .with_context(|| format!("Could not create {}", dir.display()))
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Could not create {}", dir.display()))
}
