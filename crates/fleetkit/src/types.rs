//! Core types for fleet server operations.
//!
//! Records mirror the structs the server returns; field names follow the
//! server's wire names through serde renames.

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-side system identifier.
pub type SystemId = i64;

/// Server-side action identifier. Zero or negative means "not accepted".
pub type ActionId = i64;

/// Wire format for timestamps sent to the server.
pub const SERVER_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Advisory category of a patch.
///
/// `All` is not a server category: it means "every relevant patch" and maps
/// to a different remote query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryType {
    /// Security advisories.
    Security,
    /// Bug fix advisories.
    Bugfix,
    /// Product enhancement advisories.
    ProductEnhancement,
    /// Every relevant patch regardless of category.
    All,
}

impl AdvisoryType {
    /// Label the server uses for this category.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Security => "Security Advisory",
            Self::Bugfix => "Bug Fix Advisory",
            Self::ProductEnhancement => "Product Enhancement Advisory",
            Self::All => "All Relevant Errata",
        }
    }

    /// Parse a policy-file token (case-insensitive).
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "security" => Some(Self::Security),
            "bugfix" => Some(Self::Bugfix),
            "product_enhancement" => Some(Self::ProductEnhancement),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

impl fmt::Display for AdvisoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Login credentials.
#[derive(Clone)]
pub struct Credentials {
    /// Login name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// An authenticated session token.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(String);

impl SessionKey {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey(***)")
    }
}

/// A system matched by name (`system.getId`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemRecord {
    /// System id.
    pub id: SystemId,
    /// Profile name.
    pub name: String,
}

/// A member of a system group (`systemgroup.listSystems`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    /// System id.
    pub id: SystemId,
    /// Profile name.
    pub profile_name: String,
}

/// A patch relevant to a system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erratum {
    /// Erratum id.
    pub id: i64,
    /// Advisory name, e.g. `SUSE-2030-1234`.
    pub advisory_name: String,
    /// Advisory type label.
    #[serde(default)]
    pub advisory_type: String,
    /// One-line synopsis.
    #[serde(default)]
    pub advisory_synopsis: String,
}

impl Erratum {
    /// Create an erratum with just id and advisory name.
    pub fn new(id: i64, advisory_name: impl Into<String>) -> Self {
        Self {
            id,
            advisory_name: advisory_name.into(),
            advisory_type: String::new(),
            advisory_synopsis: String::new(),
        }
    }
}

/// A product installed on a system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledProduct {
    /// User-facing product name.
    #[serde(rename = "friendlyName")]
    pub friendly_name: String,
    /// Whether this is the system's base product.
    #[serde(rename = "isBaseProduct", default)]
    pub is_base_product: bool,
}

/// An action that is scheduled or running on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledAction {
    /// Action id.
    pub id: ActionId,
    /// Action name.
    #[serde(default)]
    pub name: String,
    /// Earliest execution time as sent by the server.
    pub earliest: String,
}

impl ScheduledAction {
    /// Earliest execution time, if the server's timestamp is understood.
    #[must_use]
    pub fn earliest_time(&self) -> Option<NaiveDateTime> {
        parse_server_time(&self.earliest)
    }
}

/// A system targeted by an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSystem {
    /// System id.
    pub server_id: SystemId,
    /// Profile name.
    pub server_name: String,
}

/// A product migration target (`system.listMigrationTargets`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationTarget {
    /// Target identifier passed back to `system.scheduleProductMigration`.
    pub ident: String,
    /// Human-readable description.
    #[serde(default)]
    pub friendly: String,
}

/// A proxy on the path between server and system (`system.getConnectionPath`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyHop {
    /// Position in the path, 1 is closest to the system.
    pub position: i32,
    /// Proxy system id.
    pub id: SystemId,
    /// Proxy hostname.
    #[serde(default)]
    pub hostname: String,
}

/// Advanced options for `system.provisionSystem`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionOptions {
    /// Kernel options for the installer.
    pub kernel_options: String,
    /// Kernel options for the installed system.
    pub post_kernel_options: String,
}

/// A shell script appended to an action chain (`actionchain.addScriptRun`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRun {
    /// User the script runs as.
    pub uid: String,
    /// Group the script runs as.
    pub gid: String,
    /// Seconds the server waits for the script.
    pub timeout: i32,
    /// Script text, including its `#!` line.
    pub body: String,
}

impl ScriptRun {
    /// Default time the server waits for a script.
    pub const DEFAULT_TIMEOUT: i32 = 60;

    /// A bash script run as root.
    pub fn root_bash(command: &str) -> Self {
        Self {
            uid: "root".to_string(),
            gid: "root".to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
            body: format!("#!/bin/bash\n{command}"),
        }
    }
}

/// Render a local time the way the server expects it.
#[must_use]
pub fn format_server_time(time: &NaiveDateTime) -> String {
    time.format(SERVER_TIME_FORMAT).to_string()
}

/// Parse a timestamp as returned by the server.
///
/// Accepts RFC 3339 (converted to local time), naive ISO 8601, the compact
/// `20300101T10:00:00` form and the long `Jan 1, 2030, 10:00:00 AM` form.
#[must_use]
pub fn parse_server_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    const FORMATS: &[&str] = &[
        SERVER_TIME_FORMAT,
        "%Y-%m-%d %H:%M:%S",
        "%Y%m%dT%H:%M:%S",
        "%b %d, %Y, %I:%M:%S %p",
        "%b %d, %Y %I:%M:%S %p",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}
