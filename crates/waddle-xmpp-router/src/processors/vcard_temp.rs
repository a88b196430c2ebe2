//! XEP-0054: vcard-temp
//!
//! Stores each user's vCard as public data and serves it to anyone who asks.
//!
//! ## Paths
//!
//! - Null session / to user: answer `get` from storage on behalf of the
//!   addressed user; other types addressed to a connected user are passed on
//!   to the live connection
//! - From user to server: `get` reads the user's own vCard, `set` stores the
//!   `<vCard/>` payload or deletes the stored one when the payload is absent
//! - From user out: local destinations are answered from storage, remote ones
//!   forwarded unmodified
//!
//! The legacy upper-case `<VCARD/>` element is accepted in the same
//! namespace.

use async_trait::async_trait;
use jid::{BareJid, Jid};
use minidom::Element;
use tracing::{debug, instrument};

use crate::error::XmppError;
use crate::ns;
use crate::packet::Packet;
use crate::processor::{ElementPath, XmppProcessor};
use crate::repository::UserRepository;
use crate::session::Session;
use crate::types::StanzaType;

/// Public data key the vCard is stored under.
pub const VCARD_KEY: &str = "vCard";

const VCARD_ELEMENT: &str = "vCard";
const LEGACY_VCARD_ELEMENT: &str = "VCARD";

/// vcard-temp processor.
#[derive(Debug, Default)]
pub struct VCardTemp;

impl VCardTemp {
    pub fn new() -> Self {
        Self
    }
}

/// Whether the packet carries a vCard query in either element spelling.
pub fn is_vcard_query(packet: &Packet) -> bool {
    vcard_payload(packet).is_some_and(|elem| elem.ns() == ns::VCARD)
}

fn vcard_payload(packet: &Packet) -> Option<&Element> {
    packet
        .child(VCARD_ELEMENT)
        .or_else(|| packet.child(LEGACY_VCARD_ELEMENT))
}

/// Success reply carrying the stored vCard, or an empty `<vCard/>` when
/// nothing is stored.
///
/// A stored reply has its routing addresses cleared; the caller decides
/// where it goes.
fn build_vcard_response(packet: &Packet, stored: Option<String>) -> Result<Packet, XmppError> {
    let Some(data) = stored else {
        return Ok(packet.ok_result(None, 1));
    };

    let vcard: Element = data
        .parse()
        .map_err(|e| XmppError::storage(format!("Stored vCard is not valid XML: {e}")))?;

    let mut result = packet.ok_result(Some(vcard), 0);
    result.set_packet_from(None);
    result.set_packet_to(None);
    Ok(result)
}

fn destination_owner(packet: &Packet) -> Result<BareJid, XmppError> {
    packet
        .stanza_to()
        .map(Jid::to_bare)
        .ok_or_else(|| XmppError::bad_request(Some("Missing destination address".to_string())))
}

#[async_trait]
impl XmppProcessor for VCardTemp {
    fn id(&self) -> &str {
        ns::VCARD
    }

    fn element_paths(&self) -> Vec<ElementPath> {
        vec![
            ElementPath::new(&["iq", VCARD_ELEMENT], ns::VCARD),
            ElementPath::new(&["iq", LEGACY_VCARD_ELEMENT], ns::VCARD),
        ]
    }

    #[instrument(skip_all, fields(id = ?packet.id()))]
    async fn process_null_session(
        &self,
        packet: &Packet,
        repository: &dyn UserRepository,
        results: &mut Vec<Packet>,
    ) -> Result<(), XmppError> {
        // results addressed to a user are handled by process_to_user
        if packet.stanza_type() != Some(&StanzaType::Get) {
            return Ok(());
        }

        let owner = destination_owner(packet)?;
        let stored = repository
            .get_public_data(&owner, ns::VCARD, VCARD_KEY)
            .await?;
        results.push(build_vcard_response(packet, stored)?);
        Ok(())
    }

    #[instrument(skip_all, fields(id = ?packet.id()))]
    async fn process_from_user_to_server(
        &self,
        _connection_id: &Jid,
        packet: &Packet,
        session: &Session,
        _repository: &dyn UserRepository,
        results: &mut Vec<Packet>,
    ) -> Result<(), XmppError> {
        let mut result = match packet.stanza_type() {
            Some(StanzaType::Get) => {
                let stored = session.get_public_data(ns::VCARD, VCARD_KEY).await?;
                build_vcard_response(packet, stored)?
            }
            Some(StanzaType::Set) => {
                match vcard_payload(packet) {
                    Some(vcard) => {
                        debug!("Storing vCard");
                        session
                            .set_public_data(ns::VCARD, VCARD_KEY, &String::from(vcard))
                            .await?;
                    }
                    None => {
                        debug!("Removing vCard");
                        session.remove_public_data(ns::VCARD, VCARD_KEY).await?;
                    }
                }
                packet.ok_result(None, 0)
            }
            _ => return Ok(()),
        };

        result.set_packet_to(Some(session.connection_id()?));
        results.push(result);
        Ok(())
    }

    #[instrument(skip_all, fields(id = ?packet.id()))]
    async fn process_from_user_out(
        &self,
        connection_id: &Jid,
        packet: &Packet,
        session: &Session,
        repository: &dyn UserRepository,
        results: &mut Vec<Packet>,
    ) -> Result<(), XmppError> {
        let local = packet
            .destination_domain()
            .is_some_and(|domain| session.is_local_domain(domain, false));

        if !local {
            results.push(packet.copy_element_only());
            return Ok(());
        }

        let owner = destination_owner(packet)?;
        let stored = repository
            .get_public_data(&owner, ns::VCARD, VCARD_KEY)
            .await?;
        let mut result = build_vcard_response(packet, stored)?;
        result.set_packet_to(Some(connection_id.clone()));
        results.push(result);
        Ok(())
    }

    #[instrument(skip_all, fields(id = ?packet.id()))]
    async fn process_to_user(
        &self,
        packet: &Packet,
        session: Option<&Session>,
        repository: &dyn UserRepository,
        results: &mut Vec<Packet>,
    ) -> Result<(), XmppError> {
        self.process_null_session(packet, repository, results).await?;

        let Some(session) = session else {
            return Ok(());
        };
        if !session.is_authorized() || packet.stanza_type() == Some(&StanzaType::Get) {
            return Ok(());
        }
        let Some(to) = packet.stanza_to() else {
            return Ok(());
        };

        match session.connection_id_for(to) {
            Ok(Some(connection_id)) => {
                results.push(packet.copy_element_only().with_packet_to(connection_id));
            }
            Ok(None) | Err(XmppError::NoConnectionId) => {
                debug!(to = %to, "Recipient no longer online, dropping vCard");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn disco_features(&self, _session: Option<&Session>) -> Vec<String> {
        vec![ns::VCARD.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryUserRepository;

    fn vcard_get_to(to: &str) -> Packet {
        Packet::iq(
            "v1",
            StanzaType::Get,
            Some("bob@example.com/home".parse().unwrap()),
            Some(to.parse().unwrap()),
            Some(Element::builder("vCard", ns::VCARD).build()),
        )
    }

    #[test]
    fn test_is_vcard_query() {
        assert!(is_vcard_query(&vcard_get_to("alice@example.com")));

        let legacy = Packet::iq(
            "v2",
            StanzaType::Get,
            None,
            None,
            Some(Element::builder("VCARD", ns::VCARD).build()),
        );
        assert!(is_vcard_query(&legacy));

        let other = Packet::iq(
            "v3",
            StanzaType::Get,
            None,
            None,
            Some(Element::builder("vCard", "urn:other").build()),
        );
        assert!(!is_vcard_query(&other));
    }

    #[tokio::test]
    async fn test_null_session_returns_stored_vcard() {
        let repository = MemoryUserRepository::new(false);
        let alice = BareJid::new("alice@example.com").unwrap();
        repository.add_user(&alice).await.unwrap();
        repository
            .set_public_data(
                &alice,
                ns::VCARD,
                VCARD_KEY,
                "<vCard xmlns='vcard-temp'><FN>Alice</FN></vCard>",
            )
            .await
            .unwrap();

        let mut results = Vec::new();
        VCardTemp
            .process_null_session(&vcard_get_to("alice@example.com"), &repository, &mut results)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let vcard = results[0].child("vCard").unwrap();
        assert_eq!(
            vcard.get_child("FN", ns::VCARD).map(|e| e.text()),
            Some("Alice".to_string())
        );
        assert!(results[0].packet_to().is_none());
    }

    #[tokio::test]
    async fn test_null_session_empty_vcard() {
        let repository = MemoryUserRepository::new(true);
        let mut results = Vec::new();
        VCardTemp
            .process_null_session(&vcard_get_to("carol@example.com"), &repository, &mut results)
            .await
            .unwrap();

        assert_eq!(results[0].stanza_type(), Some(&StanzaType::Result));
        let vcard = results[0].child("vCard").unwrap();
        assert!(vcard.children().next().is_none());
    }

    #[tokio::test]
    async fn test_null_session_unknown_user() {
        let repository = MemoryUserRepository::new(false);
        let mut results = Vec::new();
        let result = VCardTemp
            .process_null_session(&vcard_get_to("nobody@example.com"), &repository, &mut results)
            .await;

        assert!(matches!(result, Err(XmppError::UserNotFound(_))));
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_null_session_ignores_results() {
        let repository = MemoryUserRepository::new(false);
        let packet = Packet::iq(
            "v1",
            StanzaType::Result,
            None,
            Some("alice@example.com".parse().unwrap()),
            Some(Element::builder("vCard", ns::VCARD).build()),
        );
        let mut results = Vec::new();
        VCardTemp
            .process_null_session(&packet, &repository, &mut results)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_stored_vcard_is_storage_error() {
        let repository = MemoryUserRepository::new(true);
        let alice = BareJid::new("alice@example.com").unwrap();
        repository
            .set_public_data(&alice, ns::VCARD, VCARD_KEY, "<vCard")
            .await
            .unwrap();

        let mut results = Vec::new();
        let result = VCardTemp
            .process_null_session(&vcard_get_to("alice@example.com"), &repository, &mut results)
            .await;
        assert!(matches!(result, Err(XmppError::Storage(_))));
    }
}
