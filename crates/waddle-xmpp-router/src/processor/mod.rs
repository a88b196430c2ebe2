//! Processor plugins and element-path matching.
//!
//! A processor declares which stanzas it handles as element paths with a
//! namespace (`iq/vCard` in `vcard-temp`) and implements whichever of the
//! five dispatch paths it cares about. Unimplemented paths are no-ops.

mod registry;

use async_trait::async_trait;
use jid::Jid;
use minidom::Element;

pub use registry::ProcessorRegistry;

use crate::error::XmppError;
use crate::packet::Packet;
use crate::repository::UserRepository;
use crate::session::Session;

/// Element path plus the namespace of its innermost element.
///
/// A single-element path matches the stanza itself; longer paths descend
/// into the stanza's children by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementPath {
    elements: Vec<String>,
    namespace: String,
}

impl ElementPath {
    pub fn new(elements: &[&str], namespace: &str) -> Self {
        Self {
            elements: elements.iter().map(|e| e.to_string()).collect(),
            namespace: namespace.to_string(),
        }
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Whether the packet has this path and the innermost element is in
    /// this path's namespace.
    pub fn matches(&self, packet: &Packet) -> bool {
        match self.elements.split_first() {
            Some((top, [])) => top == packet.name() && self.namespace == packet.namespace(),
            Some((top, rest)) => {
                top == packet.name()
                    && children_match(packet.payload().iter(), rest, &self.namespace)
            }
            None => false,
        }
    }
}

fn children_match<'a>(
    mut children: impl Iterator<Item = &'a Element>,
    path: &[String],
    namespace: &str,
) -> bool {
    match path {
        [] => false,
        [last] => children.any(|child| child.name() == last && child.ns() == namespace),
        [next, rest @ ..] => children
            .filter(|child| child.name() == next)
            .any(|child| children_match(child.children(), rest, namespace)),
    }
}

/// A protocol plugin invoked by the dispatch engine.
///
/// Results are appended to `results`; on `Err` the engine discards them and
/// answers with the error stanza the failure maps to.
#[async_trait]
pub trait XmppProcessor: Send + Sync {
    /// Unique processor id.
    fn id(&self) -> &str;

    /// Stanzas this processor handles.
    fn element_paths(&self) -> Vec<ElementPath>;

    /// Stanza for a local destination arriving without a session.
    async fn process_null_session(
        &self,
        _packet: &Packet,
        _repository: &dyn UserRepository,
        _results: &mut Vec<Packet>,
    ) -> Result<(), XmppError> {
        Ok(())
    }

    /// Request from the session's user to its own account or server.
    async fn process_from_user_to_server(
        &self,
        _connection_id: &Jid,
        _packet: &Packet,
        _session: &Session,
        _repository: &dyn UserRepository,
        _results: &mut Vec<Packet>,
    ) -> Result<(), XmppError> {
        Ok(())
    }

    /// Stanza from the session's user to another entity.
    async fn process_from_user_out(
        &self,
        _connection_id: &Jid,
        _packet: &Packet,
        _session: &Session,
        _repository: &dyn UserRepository,
        _results: &mut Vec<Packet>,
    ) -> Result<(), XmppError> {
        Ok(())
    }

    /// Stanza addressed to the session's user.
    async fn process_to_user(
        &self,
        _packet: &Packet,
        _session: Option<&Session>,
        _repository: &dyn UserRepository,
        _results: &mut Vec<Packet>,
    ) -> Result<(), XmppError> {
        Ok(())
    }

    /// Stanza addressed to the server's own component identity.
    async fn process_server_session(
        &self,
        _packet: &Packet,
        _session: Option<&Session>,
        _repository: &dyn UserRepository,
        _results: &mut Vec<Packet>,
    ) -> Result<(), XmppError> {
        Ok(())
    }

    /// Stream features to advertise to the session.
    fn stream_features(&self, _session: Option<&Session>) -> Vec<Element> {
        Vec::new()
    }

    /// Service discovery features (`var` values).
    fn disco_features(&self, _session: Option<&Session>) -> Vec<String> {
        Vec::new()
    }
}
