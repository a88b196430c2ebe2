//! Per-connection session state seen by processors.
//!
//! A session is created by the connection manager when a client connects and
//! dropped when it disconnects. The dispatch core only reads and updates it:
//! authorization state, scoped session data and the user's public data.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use jid::{BareJid, Jid};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::XmppError;
use crate::repository::UserRepository;
use crate::router::DomainResolver;

/// State of one client connection.
pub struct Session {
    connection_id: Option<Jid>,
    domain: String,
    user: RwLock<Option<Jid>>,
    authorized: AtomicBool,
    session_data: DashMap<String, String>,
    repository: Arc<dyn UserRepository>,
    resolver: Arc<dyn DomainResolver>,
    dispatch_lock: Mutex<()>,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Create an unauthorized session on `domain`.
    ///
    /// `connection_id` is the routing address of the client connection;
    /// `None` for sessions without a live connection.
    pub fn new(
        connection_id: Option<Jid>,
        domain: &str,
        repository: Arc<dyn UserRepository>,
        resolver: Arc<dyn DomainResolver>,
    ) -> Self {
        Self {
            connection_id,
            domain: domain.to_ascii_lowercase(),
            user: RwLock::new(None),
            authorized: AtomicBool::new(false),
            session_data: DashMap::new(),
            repository,
            resolver,
            dispatch_lock: Mutex::new(()),
            created_at: Utc::now(),
        }
    }

    /// Mark the session authorized for `jid`.
    pub fn authorize(&self, jid: Jid) {
        debug!(jid = %jid, "Session authorized");
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(jid);
        self.authorized.store(true, Ordering::Release);
    }

    /// Drop authorization, keeping session data.
    pub fn deauthorize(&self) {
        self.authorized.store(false, Ordering::Release);
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::Acquire)
    }

    /// Domain the client connected to.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The authorized user's JID, as bound.
    pub fn user_jid(&self) -> Option<Jid> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn bare_jid(&self) -> Option<BareJid> {
        self.user_jid().map(|jid| jid.to_bare())
    }

    /// Whether `jid` belongs to this session's user.
    pub fn is_user_id(&self, jid: &BareJid) -> bool {
        self.bare_jid().is_some_and(|bare| &bare == jid)
    }

    /// Whether `domain` is hosted here, optionally counting component domains.
    pub fn is_local_domain(&self, domain: &str, include_components: bool) -> bool {
        if include_components {
            self.resolver.is_local_or_component(domain)
        } else {
            self.resolver.is_local(domain)
        }
    }

    /// Routing address of this session's connection.
    pub fn connection_id(&self) -> Result<Jid, XmppError> {
        self.connection_id.clone().ok_or(XmppError::NoConnectionId)
    }

    /// Connection serving `jid` within this session.
    ///
    /// A bare JID or this session's own full JID map to the connection; any
    /// other resource is not connected here and yields `Ok(None)`.
    pub fn connection_id_for(&self, jid: &Jid) -> Result<Option<Jid>, XmppError> {
        let connection_id = self.connection_id()?;
        if jid.is_bare() || self.user_jid().as_ref() == Some(jid) {
            Ok(Some(connection_id))
        } else {
            Ok(None)
        }
    }

    pub fn put_session_data(&self, key: &str, value: impl Into<String>) {
        self.session_data.insert(key.to_string(), value.into());
    }

    pub fn get_session_data(&self, key: &str) -> Option<String> {
        self.session_data.get(key).map(|value| value.clone())
    }

    pub fn remove_session_data(&self, key: &str) -> Option<String> {
        self.session_data.remove(key).map(|(_, value)| value)
    }

    fn authorized_user(&self) -> Result<BareJid, XmppError> {
        if !self.is_authorized() {
            return Err(XmppError::NotAuthorized);
        }
        self.bare_jid().ok_or(XmppError::NotAuthorized)
    }

    /// Read the user's public data for `namespace`.
    pub async fn get_public_data(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<String>, XmppError> {
        let user = self.authorized_user()?;
        self.repository.get_public_data(&user, namespace, key).await
    }

    pub async fn set_public_data(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
    ) -> Result<(), XmppError> {
        let user = self.authorized_user()?;
        self.repository
            .set_public_data(&user, namespace, key, value)
            .await
    }

    pub async fn remove_public_data(&self, namespace: &str, key: &str) -> Result<(), XmppError> {
        let user = self.authorized_user()?;
        self.repository
            .remove_public_data(&user, namespace, key)
            .await
    }

    /// Serialize dispatches that touch this session.
    pub(crate) async fn lock_dispatch(&self) -> MutexGuard<'_, ()> {
        self.dispatch_lock.lock().await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection_id", &self.connection_id)
            .field("domain", &self.domain)
            .field("user", &self.user_jid())
            .field("authorized", &self.is_authorized())
            .finish()
    }
}
