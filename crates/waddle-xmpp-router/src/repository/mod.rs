//! User data repository contract.
//!
//! Per-user storage is a tree of subnodes (`"public/vcard-temp"`), each
//! holding string values and string lists under keys. Processors reach it
//! through the [`Session`](crate::session::Session) for the connected user
//! or directly for offline lookups.

mod memory;

use async_trait::async_trait;
use jid::BareJid;

pub use memory::MemoryUserRepository;

use crate::error::XmppError;

/// Root subnode for data other users may read.
pub const PUBLIC_DATA_NODE: &str = "public";

/// Subnode holding public data for a namespace.
pub fn public_subnode(namespace: &str) -> String {
    format!("{PUBLIC_DATA_NODE}/{namespace}")
}

/// Key/value and list storage keyed by user identity.
///
/// Operations on a user that does not exist fail with
/// [`XmppError::UserNotFound`]; backend failures map to
/// [`XmppError::Storage`]. A `subnode` of `None` addresses the user's root
/// node.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn user_exists(&self, user: &BareJid) -> Result<bool, XmppError>;

    /// Create a user. Fails with [`XmppError::UserExists`] if present.
    async fn add_user(&self, user: &BareJid) -> Result<(), XmppError>;

    async fn remove_user(&self, user: &BareJid) -> Result<(), XmppError>;

    async fn users(&self) -> Result<Vec<BareJid>, XmppError>;

    async fn users_count(&self) -> Result<usize, XmppError>;

    async fn users_count_for_domain(&self, domain: &str) -> Result<usize, XmppError>;

    /// Single value under a key, `None` if unset.
    async fn get_data(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
        key: &str,
    ) -> Result<Option<String>, XmppError>;

    async fn set_data(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
        key: &str,
        value: &str,
    ) -> Result<(), XmppError>;

    async fn remove_data(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
        key: &str,
    ) -> Result<(), XmppError>;

    async fn get_data_list(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
        key: &str,
    ) -> Result<Option<Vec<String>>, XmppError>;

    async fn set_data_list(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
        key: &str,
        values: &[String],
    ) -> Result<(), XmppError>;

    /// Append values to a list, creating it if unset.
    async fn add_data_list(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
        key: &str,
        values: &[String],
    ) -> Result<(), XmppError>;

    /// Keys stored directly in a subnode.
    async fn get_keys(&self, user: &BareJid, subnode: Option<&str>)
        -> Result<Vec<String>, XmppError>;

    /// Names of the immediate child subnodes.
    async fn get_subnodes(
        &self,
        user: &BareJid,
        subnode: Option<&str>,
    ) -> Result<Vec<String>, XmppError>;

    /// Remove a subnode with everything below it.
    async fn remove_subnode(&self, user: &BareJid, subnode: &str) -> Result<(), XmppError>;

    async fn get_public_data(
        &self,
        user: &BareJid,
        namespace: &str,
        key: &str,
    ) -> Result<Option<String>, XmppError> {
        self.get_data(user, Some(&public_subnode(namespace)), key)
            .await
    }

    async fn set_public_data(
        &self,
        user: &BareJid,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<(), XmppError> {
        self.set_data(user, Some(&public_subnode(namespace)), key, value)
            .await
    }

    async fn remove_public_data(
        &self,
        user: &BareJid,
        namespace: &str,
        key: &str,
    ) -> Result<(), XmppError> {
        self.remove_data(user, Some(&public_subnode(namespace)), key)
            .await
    }
}
