use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jid::BareJid;
use tracing::{debug, info};

use super::UserRepository;
use crate::error::XmppError;

/// Subnode path → key → values.
type UserNode = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// In-memory user repository.
///
/// With `auto_create_user`, reads and writes for a missing user create it
/// instead of failing with [`XmppError::UserNotFound`], and removals for a
/// missing user succeed silently.
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: DashMap<BareJid, UserNode>,
    auto_create_user: bool,
}

impl MemoryUserRepository {
    pub fn new(auto_create_user: bool) -> Self {
        info!(auto_create_user, "In-memory user repository initialized");
        Self {
            users: DashMap::new(),
            auto_create_user,
        }
    }

    fn with_user<R>(
        &self,
        user: &BareJid,
        f: impl FnOnce(&mut UserNode) -> R,
    ) -> Result<R, XmppError> {
        if let Some(mut node) = self.users.get_mut(user) {
            return Ok(f(node.value_mut()));
        }

        if self.auto_create_user {
            debug!(user = %user, "Auto-creating user");
            let mut node = self.users.entry(user.clone()).or_default();
            return Ok(f(node.value_mut()));
        }

        Err(XmppError::user_not_found(user))
    }

    fn remove_from_user(
        &self,
        user: &BareJid,
        f: impl FnOnce(&mut UserNode),
    ) -> Result<(), XmppError> {
        match self.users.get_mut(user) {
            Some(mut node) => {
                f(node.value_mut());
                Ok(())
            }
            None if self.auto_create_user => Ok(()),
            None => Err(XmppError::user_not_found(user)),
        }
    }
}

fn node_path(subnode: Option<&str>) -> String {
    subnode.unwrap_or_default().trim_matches('/').to_string()
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn user_exists(&self, user: &BareJid) -> Result<bool, XmppError> {
        Ok(self.users.contains_key(user))
    }

    async fn add_user(&self, user: &BareJid) -> Result<(), XmppError> {
        match self.users.entry(user.clone()) {
            Entry::Occupied(_) => Err(XmppError::UserExists(user.to_string())),
            Entry::Vacant(entry) => {
                entry.insert(UserNode::new());
                debug!(user = %user, "User added");
                Ok(())
            }
        }
    }

    async fn remove_user(&self, user: &BareJid) -> Result<(), XmppError> {
        if self.users.remove(user).is_none() {
            return Err(XmppError::user_not_found(user));
        }
        debug!(user = %user, "User removed");
        Ok(())
    }

    async fn users(&self) -> Result<Vec<BareJid>, XmppError> {
        Ok(self.users.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn users_count(&self) -> Result<usize, XmppError> {
        Ok(self.users.len())
    }

    async fn users_count_for_domain(&self, domain: &str) -> Result<usize, XmppError> {
        Ok(self
            .users
            .iter()
            .filter(|entry| entry.key().domain().as_str().eq_ignore_ascii_case(domain))
            .count())
    }

    async fn get_data(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
        key: &str,
    ) -> Result<Option<String>, XmppError> {
        let path = node_path(subnode);
        self.with_user(user, |node| {
            node.get(&path)
                .and_then(|keys| keys.get(key))
                .and_then(|values| values.first().cloned())
        })
    }

    async fn set_data(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
        key: &str,
        value: &str,
    ) -> Result<(), XmppError> {
        let path = node_path(subnode);
        self.with_user(user, |node| {
            node.entry(path)
                .or_default()
                .insert(key.to_string(), vec![value.to_string()]);
        })
    }

    async fn remove_data(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
        key: &str,
    ) -> Result<(), XmppError> {
        let path = node_path(subnode);
        self.remove_from_user(user, |node| {
            if let Some(keys) = node.get_mut(&path) {
                keys.remove(key);
            }
        })
    }

    async fn get_data_list(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
        key: &str,
    ) -> Result<Option<Vec<String>>, XmppError> {
        let path = node_path(subnode);
        self.with_user(user, |node| {
            node.get(&path).and_then(|keys| keys.get(key)).cloned()
        })
    }

    async fn set_data_list(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
        key: &str,
        values: &[String],
    ) -> Result<(), XmppError> {
        let path = node_path(subnode);
        self.with_user(user, |node| {
            node.entry(path)
                .or_default()
                .insert(key.to_string(), values.to_vec());
        })
    }

    async fn add_data_list(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
        key: &str,
        values: &[String],
    ) -> Result<(), XmppError> {
        let path = node_path(subnode);
        self.with_user(user, |node| {
            node.entry(path)
                .or_default()
                .entry(key.to_string())
                .or_default()
                .extend_from_slice(values);
        })
    }

    async fn get_keys(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
    ) -> Result<Vec<String>, XmppError> {
        let path = node_path(subnode);
        self.with_user(user, |node| {
            node.get(&path)
                .map(|keys| keys.keys().cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn get_subnodes(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
    ) -> Result<Vec<String>, XmppError> {
        let path = node_path(subnode);
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };

        self.with_user(user, |node| {
            let mut children: Vec<String> = node
                .keys()
                .filter_map(|candidate| candidate.strip_prefix(&prefix))
                .filter(|rest| !rest.is_empty())
                .filter_map(|rest| rest.split('/').next())
                .map(String::from)
                .collect();
            children.dedup();
            children
        })
    }

    async fn remove_subnode(&self, user: &BareJid, subnode: &str) -> Result<(), XmppError> {
        let path = node_path(Some(subnode));
        let prefix = format!("{path}/");
        self.remove_from_user(user, |node| {
            node.retain(|candidate, _| candidate != &path && !candidate.starts_with(&prefix));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::public_subnode;

    fn alice() -> BareJid {
        BareJid::new("alice@example.com").unwrap()
    }

    #[tokio::test]
    async fn test_missing_user_fails_without_auto_create() {
        let repository = MemoryUserRepository::new(false);
        let result = repository.get_data(&alice(), None, "k").await;
        assert!(matches!(result, Err(XmppError::UserNotFound(_))));

        let result = repository.remove_data(&alice(), None, "k").await;
        assert!(matches!(result, Err(XmppError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn test_auto_create_user() {
        let repository = MemoryUserRepository::new(true);
        assert_eq!(repository.get_data(&alice(), None, "k").await.unwrap(), None);
        assert!(repository.user_exists(&alice()).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_user_twice() {
        let repository = MemoryUserRepository::new(false);
        repository.add_user(&alice()).await.unwrap();
        assert!(matches!(
            repository.add_user(&alice()).await,
            Err(XmppError::UserExists(_))
        ));
        assert_eq!(repository.users_count().await.unwrap(), 1);
        assert_eq!(repository.users_count_for_domain("EXAMPLE.com").await.unwrap(), 1);
        assert_eq!(repository.users_count_for_domain("example.org").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_data_and_lists() {
        let repository = MemoryUserRepository::new(false);
        repository.add_user(&alice()).await.unwrap();

        repository
            .set_data(&alice(), Some("/roster/"), "ver", "3")
            .await
            .unwrap();
        assert_eq!(
            repository.get_data(&alice(), Some("roster"), "ver").await.unwrap(),
            Some("3".to_string())
        );

        let groups = vec!["friends".to_string()];
        repository
            .add_data_list(&alice(), Some("roster"), "groups", &groups)
            .await
            .unwrap();
        repository
            .add_data_list(&alice(), Some("roster"), "groups", &["work".to_string()])
            .await
            .unwrap();
        assert_eq!(
            repository
                .get_data_list(&alice(), Some("roster"), "groups")
                .await
                .unwrap(),
            Some(vec!["friends".to_string(), "work".to_string()])
        );
        assert_eq!(
            repository.get_keys(&alice(), Some("roster")).await.unwrap(),
            vec!["groups", "ver"]
        );
    }

    #[tokio::test]
    async fn test_subnodes() {
        let repository = MemoryUserRepository::new(false);
        repository.add_user(&alice()).await.unwrap();

        repository
            .set_public_data(&alice(), "vcard-temp", "vCard", "<vCard/>")
            .await
            .unwrap();
        repository
            .set_data(&alice(), Some(&public_subnode("jabber:iq:last")), "t", "0")
            .await
            .unwrap();
        repository.set_data(&alice(), Some("privacy"), "default", "x").await.unwrap();

        assert_eq!(
            repository.get_subnodes(&alice(), None).await.unwrap(),
            vec!["privacy", "public"]
        );
        assert_eq!(
            repository.get_subnodes(&alice(), Some("public")).await.unwrap(),
            vec!["jabber:iq:last", "vcard-temp"]
        );

        repository.remove_subnode(&alice(), "public").await.unwrap();
        assert_eq!(
            repository
                .get_public_data(&alice(), "vcard-temp", "vCard")
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            repository.get_subnodes(&alice(), None).await.unwrap(),
            vec!["privacy"]
        );
    }
}
