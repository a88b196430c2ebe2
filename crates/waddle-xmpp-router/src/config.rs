//! Routing core configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables prefixed with `WADDLE_ROUTER`, using `__` to descend
//! into sections.
//!
//! # Environment Variables
//!
//! - `WADDLE_ROUTER__DEFAULT_HOSTNAME`: Hostname used for component addresses. Default: `localhost`
//! - `WADDLE_ROUTER__SESSION_MANAGER_NAME`: Component name of the dispatch engine. Default: `sess-man`
//! - `WADDLE_ROUTER__STRICT_REGISTRATION`: Fail startup on duplicate registrations. Default: `false`
//! - `WADDLE_ROUTER__VHOSTS__REPOSITORY__KIND`: `memory` or `file`. Default: `memory`
//! - `WADDLE_ROUTER__VHOSTS__REPOSITORY__PATH`: VHost list for the `file` repository
//! - `WADDLE_ROUTER__USERS__AUTO_CREATE_USER`: Create missing users on access. Default: `false`
//!
//! # Example
//!
//! ```toml
//! default_hostname = "example.com"
//!
//! [vhosts.repository]
//! kind = "memory"
//!
//! [[vhosts.items]]
//! domain = "example.com"
//!
//! [[vhosts.items]]
//! domain = "muc.example.com"
//! components = ["muc"]
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::XmppError;
use crate::vhost::VHostItem;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "WADDLE_ROUTER";

/// Where vhost records come from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VHostRepositoryKind {
    /// Seeded from the configured items
    #[default]
    Memory,
    /// TOML file with a `[[vhost]]` list
    File { path: PathBuf },
}

impl VHostRepositoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VHostRepositoryKind::Memory => "memory",
            VHostRepositoryKind::File { .. } => "file",
        }
    }
}

/// VHost registry settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VHostSettings {
    pub repository: VHostRepositoryKind,
    /// Records for the memory repository
    pub items: Vec<VHostItem>,
}

/// User repository settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRepositorySettings {
    /// Create missing users on read or write instead of failing
    pub auto_create_user: bool,
}

/// Top-level routing core settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Hostname used for component addresses (`name@hostname`)
    pub default_hostname: String,
    /// Component name the dispatch engine answers to
    pub session_manager_name: String,
    /// Abort startup on duplicate component or processor registration
    pub strict_registration: bool,
    pub vhosts: VHostSettings,
    pub users: UserRepositorySettings,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            default_hostname: "localhost".to_string(),
            session_manager_name: "sess-man".to_string(),
            strict_registration: false,
            vhosts: VHostSettings::default(),
            users: UserRepositorySettings::default(),
        }
    }
}

impl RouterSettings {
    /// Load settings from an optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, XmppError> {
        Self::load_with_env(path, None)
    }

    /// Load settings, taking environment variables from `env` instead of
    /// the process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, XmppError> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let settings: Self = builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| XmppError::config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), XmppError> {
        if self.default_hostname.trim().is_empty() {
            return Err(XmppError::config("default_hostname must not be empty"));
        }
        if self.session_manager_name.trim().is_empty() {
            return Err(XmppError::config("session_manager_name must not be empty"));
        }
        Ok(())
    }

    /// Log the effective configuration.
    pub fn log_config(&self) {
        info!("Default hostname: {}", self.default_hostname);
        info!("Session manager: {}", self.session_manager_name);
        info!(
            "VHost repository: {} ({} configured items)",
            self.vhosts.repository.as_str(),
            self.vhosts.items.len()
        );
        info!(
            "User auto-creation: {}",
            if self.users.auto_create_user { "enabled" } else { "disabled" }
        );
        if self.strict_registration {
            info!("Strict registration: duplicate registrations abort startup");
        }
    }
}
