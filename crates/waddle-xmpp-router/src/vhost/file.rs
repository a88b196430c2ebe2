//! VHost list loaded from a TOML file.
//!
//! ```toml
//! [[vhost]]
//! domain = "example.com"
//!
//! [[vhost]]
//! domain = "chat.example.com"
//! components = ["muc"]
//! anonymous_enabled = true
//! ```

use std::path::Path;

use serde::Deserialize;

use super::{MemoryVHostRepository, VHostItem, VHostRepository};
use crate::error::XmppError;

#[derive(Debug, Deserialize)]
struct VHostFile {
    #[serde(default)]
    vhost: Vec<VHostItem>,
}

/// Read-only vhost repository backed by a TOML file, read once at startup.
#[derive(Debug)]
pub struct FileVHostRepository {
    inner: MemoryVHostRepository,
}

impl FileVHostRepository {
    pub fn from_toml_str(contents: &str) -> Result<Self, XmppError> {
        let file: VHostFile = toml::from_str(contents)
            .map_err(|e| XmppError::config(format!("Invalid vhost file: {e}")))?;

        let inner = MemoryVHostRepository::new();
        for item in file.vhost {
            inner.add_item(item);
        }

        Ok(Self { inner })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, XmppError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            XmppError::config(format!("Failed to read vhost file {}: {e}", path.display()))
        })?;

        Self::from_toml_str(&contents)
    }
}

impl VHostRepository for FileVHostRepository {
    fn get(&self, domain: &str) -> Option<VHostItem> {
        self.inner.get(domain)
    }

    fn all_items(&self) -> Vec<VHostItem> {
        self.inner.all_items()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vhost_file() {
        let repository = FileVHostRepository::from_toml_str(
            r#"
            [[vhost]]
            domain = "Example.com"

            [[vhost]]
            domain = "chat.example.com"
            components = ["muc", "pubsub"]
            anonymous_enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(repository.size(), 2);
        assert!(repository.contains("example.com"));

        let chat = repository.get("chat.example.com").unwrap();
        assert_eq!(chat.components, vec!["muc", "pubsub"]);
        assert!(chat.anonymous_enabled);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let result = FileVHostRepository::from_toml_str("[[vhost]]\nanonymous_enabled = 1");
        assert!(matches!(result, Err(XmppError::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = FileVHostRepository::from_path("/nonexistent/vhosts.toml");
        assert!(matches!(result, Err(XmppError::Config(_))));
    }
}
