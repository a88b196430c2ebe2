//! Virtual host registry.
//!
//! A vhost is a domain the server treats as locally hosted. The router only
//! reads vhost records through [`VHostRepository`]; where they come from is
//! decided at startup by [`build_repository`].

mod file;
mod memory;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use file::FileVHostRepository;
pub use memory::MemoryVHostRepository;

use crate::config::{VHostRepositoryKind, VHostSettings};
use crate::error::XmppError;

/// Configuration record for one virtual host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VHostItem {
    /// Domain name, lower-cased
    pub domain: String,
    /// Components bound exclusively to this domain, in routing order.
    /// Empty means the generic local handlers serve it.
    #[serde(default)]
    pub components: Vec<String>,
    /// Whether anonymous logins are accepted for this domain
    #[serde(default)]
    pub anonymous_enabled: bool,
}

impl VHostItem {
    /// Create a vhost served by the generic local handlers.
    pub fn new(domain: &str) -> Self {
        Self {
            domain: normalize_domain(domain),
            components: Vec::new(),
            anonymous_enabled: false,
        }
    }

    /// Bind explicit components to this vhost.
    pub fn with_components<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.components = components.into_iter().map(Into::into).collect();
        self
    }

    /// Enable anonymous logins.
    pub fn with_anonymous(mut self, enabled: bool) -> Self {
        self.anonymous_enabled = enabled;
        self
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.domain = normalize_domain(&self.domain);
        self
    }
}

/// Lookup contract over the set of configured virtual hosts.
///
/// All lookups are case-insensitive.
pub trait VHostRepository: Send + Sync {
    /// Fetch the record for a domain.
    fn get(&self, domain: &str) -> Option<VHostItem>;

    /// Whether the domain is a configured vhost.
    fn contains(&self, domain: &str) -> bool {
        self.get(domain).is_some()
    }

    /// All records in configuration order.
    fn all_items(&self) -> Vec<VHostItem>;

    /// Number of configured vhosts.
    fn size(&self) -> usize;

    /// Number of vhosts equal to `domain` or below it (`*.domain`).
    fn count_for_domain_suffix(&self, domain: &str) -> usize {
        let domain = normalize_domain(domain);
        let suffix = format!(".{domain}");
        self.all_items()
            .iter()
            .filter(|item| item.domain == domain || item.domain.ends_with(&suffix))
            .count()
    }
}

/// Domain names of every configured vhost.
pub fn all_vhosts(repository: &dyn VHostRepository) -> Vec<String> {
    repository
        .all_items()
        .into_iter()
        .map(|item| item.domain)
        .collect()
}

/// The first configured vhost, or `fallback` when none are configured.
pub fn default_vhost(repository: &dyn VHostRepository, fallback: &str) -> String {
    repository
        .all_items()
        .into_iter()
        .next()
        .map(|item| item.domain)
        .unwrap_or_else(|| normalize_domain(fallback))
}

/// Build the vhost repository selected by configuration.
pub fn build_repository(settings: &VHostSettings) -> Result<Arc<dyn VHostRepository>, XmppError> {
    let repository: Arc<dyn VHostRepository> = match &settings.repository {
        VHostRepositoryKind::Memory => {
            let repository = MemoryVHostRepository::new();
            for item in &settings.items {
                repository.add_item(item.clone());
            }
            Arc::new(repository)
        }
        VHostRepositoryKind::File { path } => Arc::new(FileVHostRepository::from_path(path)?),
    };

    info!(
        kind = settings.repository.as_str(),
        vhosts = repository.size(),
        "VHost repository initialized"
    );

    Ok(repository)
}

pub(crate) fn normalize_domain(domain: &str) -> String {
    domain.trim_end_matches('.').to_ascii_lowercase()
}
