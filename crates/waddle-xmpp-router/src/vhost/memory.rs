use std::sync::{PoisonError, RwLock};

use tracing::debug;

use super::{normalize_domain, VHostItem, VHostRepository};

/// In-memory vhost repository, kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryVHostRepository {
    items: RwLock<Vec<VHostItem>>,
}

impl MemoryVHostRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a vhost record. A replaced record keeps its position.
    pub fn add_item(&self, item: VHostItem) {
        let item = item.normalized();
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);

        match items.iter_mut().find(|existing| existing.domain == item.domain) {
            Some(existing) => *existing = item,
            None => {
                debug!(domain = %item.domain, "VHost added");
                items.push(item);
            }
        }
    }

    /// Remove a vhost record, returning it if it was present.
    pub fn remove_item(&self, domain: &str) -> Option<VHostItem> {
        let domain = normalize_domain(domain);
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        let position = items.iter().position(|item| item.domain == domain)?;
        debug!(domain = %domain, "VHost removed");
        Some(items.remove(position))
    }
}

impl VHostRepository for MemoryVHostRepository {
    fn get(&self, domain: &str) -> Option<VHostItem> {
        let domain = normalize_domain(domain);
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|item| item.domain == domain)
            .cloned()
    }

    fn all_items(&self) -> Vec<VHostItem> {
        self.items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn size(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let repository = MemoryVHostRepository::new();
        repository.add_item(VHostItem::new("Example.COM"));

        assert!(repository.contains("example.com"));
        assert!(repository.contains("EXAMPLE.com"));
        assert_eq!(repository.get("example.COM").unwrap().domain, "example.com");
        assert!(!repository.contains("example.org"));
    }

    #[test]
    fn test_replace_keeps_position() {
        let repository = MemoryVHostRepository::new();
        repository.add_item(VHostItem::new("a.example"));
        repository.add_item(VHostItem::new("b.example"));
        repository.add_item(VHostItem::new("a.example").with_anonymous(true));

        let items = repository.all_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].domain, "a.example");
        assert!(items[0].anonymous_enabled);
    }

    #[test]
    fn test_remove_item() {
        let repository = MemoryVHostRepository::new();
        repository.add_item(VHostItem::new("example.com"));

        assert!(repository.remove_item("EXAMPLE.COM").is_some());
        assert!(repository.remove_item("example.com").is_none());
        assert_eq!(repository.size(), 0);
    }
}
