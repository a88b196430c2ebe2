//! Shared fixtures for routing and dispatch integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jid::{BareJid, Jid};
use minidom::Element;
use waddle_xmpp_router::{
    ns, Capabilities, DomainResolver, Packet, RouterSettings, RoutingCore, ServerComponent,
    StanzaType, UserRepository, VHostItem, XmppError,
};

/// vcard-temp namespace.
pub const NS_VCARD: &str = ns::VCARD;

/// Routing address of the test client connection.
pub const CONNECTION: &str = "c2s@node1/conn-1";

/// Initialize tracing for tests. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("waddle_xmpp_router=debug")
        .with_test_writer()
        .try_init();
}

/// Component that records every resolver handed to it on registration.
pub struct MockComponent {
    name: String,
    capabilities: Capabilities,
    registrations: AtomicUsize,
    resolver: Mutex<Option<Arc<dyn DomainResolver>>>,
}

impl MockComponent {
    pub fn new(name: &str, capabilities: Capabilities) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            capabilities,
            registrations: AtomicUsize::new(0),
            resolver: Mutex::new(None),
        })
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn resolver(&self) -> Option<Arc<dyn DomainResolver>> {
        self.resolver.lock().unwrap().clone()
    }
}

impl ServerComponent for MockComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn on_registered(&self, resolver: Arc<dyn DomainResolver>) {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        *self.resolver.lock().unwrap() = Some(resolver);
    }
}

/// User repository whose every call fails with the configured error.
pub struct FailingRepository {
    error: fn() -> XmppError,
}

impl FailingRepository {
    /// Backend failure on every call.
    pub fn storage() -> Arc<Self> {
        Arc::new(Self {
            error: || XmppError::storage("connection refused"),
        })
    }

    /// Every user is unknown.
    pub fn no_users() -> Arc<Self> {
        Arc::new(Self {
            error: || XmppError::user_not_found("unknown"),
        })
    }

    fn fail<T>(&self) -> Result<T, XmppError> {
        Err((self.error)())
    }
}

#[async_trait]
impl UserRepository for FailingRepository {
    async fn user_exists(&self, _user: &BareJid) -> Result<bool, XmppError> {
        self.fail()
    }

    async fn add_user(&self, _user: &BareJid) -> Result<(), XmppError> {
        self.fail()
    }

    async fn remove_user(&self, _user: &BareJid) -> Result<(), XmppError> {
        self.fail()
    }

    async fn users(&self) -> Result<Vec<BareJid>, XmppError> {
        self.fail()
    }

    async fn users_count(&self) -> Result<usize, XmppError> {
        self.fail()
    }

    async fn users_count_for_domain(&self, _domain: &str) -> Result<usize, XmppError> {
        self.fail()
    }

    async fn get_data(
        &self,
        _user: &BareJid,
        _subnode: Option<&str>,
        _key: &str,
    ) -> Result<Option<String>, XmppError> {
        self.fail()
    }

    async fn set_data(
        &self,
        _user: &BareJid,
        _subnode: Option<&str>,
        _key: &str,
        _value: &str,
    ) -> Result<(), XmppError> {
        self.fail()
    }

    async fn remove_data(
        &self,
        _user: &BareJid,
        _subnode: Option<&str>,
        _key: &str,
    ) -> Result<(), XmppError> {
        self.fail()
    }

    async fn get_data_list(
        &self,
        _user: &BareJid,
        _subnode: Option<&str>,
        _key: &str,
    ) -> Result<Option<Vec<String>>, XmppError> {
        self.fail()
    }

    async fn set_data_list(
        &self,
        _user: &BareJid,
        _subnode: Option<&str>,
        _key: &str,
        _values: &[String],
    ) -> Result<(), XmppError> {
        self.fail()
    }

    async fn add_data_list(
        &self,
        _user: &BareJid,
        _subnode: Option<&str>,
        _key: &str,
        _values: &[String],
    ) -> Result<(), XmppError> {
        self.fail()
    }

    async fn get_keys(
        &self,
        _user: &BareJid,
        _subnode: Option<&str>,
    ) -> Result<Vec<String>, XmppError> {
        self.fail()
    }

    async fn get_subnodes(
        &self,
        _user: &BareJid,
        _subnode: Option<&str>,
    ) -> Result<Vec<String>, XmppError> {
        self.fail()
    }

    async fn remove_subnode(&self, _user: &BareJid, _subnode: &str) -> Result<(), XmppError> {
        self.fail()
    }
}

/// Settings with the given vhosts and users created on first access.
pub fn settings(vhosts: &[&str]) -> RouterSettings {
    let mut settings = RouterSettings {
        default_hostname: "example.com".to_string(),
        ..RouterSettings::default()
    };
    settings.users.auto_create_user = true;
    settings
        .vhosts
        .items
        .extend(vhosts.iter().map(|domain| VHostItem::new(domain)));
    settings
}

/// Routing core hosting `example.com`.
pub fn core() -> RoutingCore {
    init_tracing();
    RoutingCore::from_settings(settings(&["example.com"])).unwrap()
}

pub fn connection() -> Jid {
    CONNECTION.parse().unwrap()
}

pub fn jid(s: &str) -> Jid {
    s.parse().unwrap()
}

pub fn bare(s: &str) -> BareJid {
    BareJid::new(s).unwrap()
}

/// vCard iq sent by the client over the test connection.
pub fn vcard_iq(stanza_type: StanzaType, to: Option<&str>, payload: Option<Element>) -> Packet {
    Packet::iq("vc1", stanza_type, None, to.map(jid), payload).with_packet_from(connection())
}

pub fn empty_vcard() -> Element {
    Element::builder("vCard", NS_VCARD).build()
}

pub fn vcard_with_name(name: &str) -> Element {
    Element::builder("vCard", NS_VCARD)
        .append(Element::builder("FN", NS_VCARD).append(name).build())
        .build()
}

/// Name of the stanza error condition in a reply, if any.
pub fn error_condition(packet: &Packet) -> Option<String> {
    let error = packet.child("error")?;
    error
        .children()
        .find(|child| child.name() != "text")
        .map(|child| child.name().to_string())
}

/// Chat message to `to` with a one-line body.
pub fn chat_message(to: &str, from: Option<&str>) -> Packet {
    let mut builder = Element::builder("message", ns::JABBER_CLIENT)
        .attr("type", "chat")
        .attr("to", to);
    if let Some(from) = from {
        builder = builder.attr("from", from);
    }
    let element = builder
        .append(Element::builder("body", ns::JABBER_CLIENT).append("hello").build())
        .build();
    Packet::from_element(&element).unwrap()
}
