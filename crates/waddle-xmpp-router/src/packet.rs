//! Packet: one parsed stanza plus its routing addresses.
//!
//! The stanza addresses (`to`/`from` attributes) say who the stanza is for.
//! The packet addresses (`packet_to`/`packet_from`) say which connection or
//! component the server received it from and must hand it to next; they never
//! appear on the wire.

use std::fmt;

use jid::Jid;
use minidom::Element;

use crate::error::XmppError;
use crate::ns;
use crate::types::{StanzaKind, StanzaType};

/// A stanza travelling through the dispatch core.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    name: String,
    namespace: String,
    id: Option<String>,
    stanza_type: Option<StanzaType>,
    stanza_to: Option<Jid>,
    stanza_from: Option<Jid>,
    packet_to: Option<Jid>,
    packet_from: Option<Jid>,
    payload: Vec<Element>,
}

impl Packet {
    /// Build a packet from a parsed top-level element.
    pub fn from_element(element: &Element) -> Result<Self, XmppError> {
        let stanza_to = element.attr("to").map(str::parse::<Jid>).transpose()?;
        let stanza_from = element.attr("from").map(str::parse::<Jid>).transpose()?;

        Ok(Self {
            name: element.name().to_string(),
            namespace: element.ns(),
            id: element.attr("id").map(String::from),
            stanza_type: element.attr("type").map(StanzaType::parse),
            stanza_to,
            stanza_from,
            packet_to: None,
            packet_from: None,
            payload: element.children().cloned().collect(),
        })
    }

    /// Build an IQ stanza in the client namespace.
    pub fn iq(
        id: &str,
        stanza_type: StanzaType,
        from: Option<Jid>,
        to: Option<Jid>,
        payload: Option<Element>,
    ) -> Self {
        Self {
            name: "iq".to_string(),
            namespace: ns::JABBER_CLIENT.to_string(),
            id: Some(id.to_string()),
            stanza_type: Some(stanza_type),
            stanza_to: to,
            stanza_from: from,
            packet_to: None,
            packet_from: None,
            payload: payload.into_iter().collect(),
        }
    }

    /// Top-level element name (`iq`, `message`, `presence`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace of the top-level element.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Stanza kind for metrics and tracing.
    pub fn kind(&self) -> StanzaKind {
        StanzaKind::from_name(&self.name)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn stanza_type(&self) -> Option<&StanzaType> {
        self.stanza_type.as_ref()
    }

    pub fn stanza_to(&self) -> Option<&Jid> {
        self.stanza_to.as_ref()
    }

    pub fn stanza_from(&self) -> Option<&Jid> {
        self.stanza_from.as_ref()
    }

    pub fn packet_to(&self) -> Option<&Jid> {
        self.packet_to.as_ref()
    }

    pub fn packet_from(&self) -> Option<&Jid> {
        self.packet_from.as_ref()
    }

    /// Child elements of the stanza.
    pub fn payload(&self) -> &[Element] {
        &self.payload
    }

    /// First child with the given element name, in any namespace.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.payload.iter().find(|child| child.name() == name)
    }

    /// Destination domain, if the stanza is addressed.
    pub fn destination_domain(&self) -> Option<&str> {
        self.stanza_to.as_ref().map(|jid| jid.domain().as_str())
    }

    /// Whether this stanza is itself an error.
    pub fn is_error(&self) -> bool {
        matches!(self.stanza_type, Some(StanzaType::Error))
    }

    pub fn set_packet_to(&mut self, to: Option<Jid>) {
        self.packet_to = to;
    }

    pub fn set_packet_from(&mut self, from: Option<Jid>) {
        self.packet_from = from;
    }

    /// Return the packet with the given routing source.
    pub fn with_packet_from(mut self, from: Jid) -> Self {
        self.packet_from = Some(from);
        self
    }

    /// Return the packet with the given routing destination.
    pub fn with_packet_to(mut self, to: Jid) -> Self {
        self.packet_to = Some(to);
        self
    }

    /// Copy of the stanza with the routing addresses cleared.
    ///
    /// Used when forwarding unmodified: the next hop decides the route from
    /// the stanza addresses alone.
    pub fn copy_element_only(&self) -> Self {
        Self {
            packet_to: None,
            packet_from: None,
            ..self.clone()
        }
    }

    /// Build a `result` reply.
    ///
    /// With `depth == 0` the content, if any, becomes the only child. With
    /// `depth >= 1` the first child of the request is copied (name and
    /// namespace only) and the content is placed inside it, so an absent
    /// content yields an empty `<vCard xmlns='vcard-temp'/>`-style payload.
    pub fn ok_result(&self, content: Option<Element>, depth: usize) -> Self {
        let payload = match (depth, self.payload.first()) {
            (0, _) | (_, None) => content.into_iter().collect(),
            (_, Some(first)) => {
                let mut wrapper = Element::builder(first.name(), first.ns());
                if let Some(content) = content {
                    wrapper = wrapper.append(content);
                }
                vec![wrapper.build()]
            }
        };

        self.reply(StanzaType::Result, payload)
    }

    /// Build a reply of the given type carrying the given children.
    pub(crate) fn reply(&self, stanza_type: StanzaType, payload: Vec<Element>) -> Self {
        Self {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            id: self.id.clone(),
            stanza_type: Some(stanza_type),
            stanza_to: self.stanza_from.clone(),
            stanza_from: self.stanza_to.clone(),
            packet_to: self.packet_from.clone(),
            packet_from: self.packet_to.clone(),
            payload,
        }
    }

    /// Render the stanza back into an element tree.
    pub fn to_element(&self) -> Element {
        let mut builder = Element::builder(self.name.as_str(), self.namespace.as_str());

        if let Some(ref id) = self.id {
            builder = builder.attr("id", id.as_str());
        }
        if let Some(ref stanza_type) = self.stanza_type {
            builder = builder.attr("type", stanza_type.as_str());
        }
        if let Some(ref to) = self.stanza_to {
            builder = builder.attr("to", to.to_string());
        }
        if let Some(ref from) = self.stanza_from {
            builder = builder.attr("from", from.to_string());
        }
        for child in &self.payload {
            builder = builder.append(child.clone());
        }

        builder.build()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from(&self.to_element()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vcard_get() -> Packet {
        let element: Element = "<iq xmlns='jabber:client' type='get' id='v1' \
             from='alice@example.com/home' to='bob@example.com'>\
             <vCard xmlns='vcard-temp'/></iq>"
            .parse()
            .unwrap();
        Packet::from_element(&element).unwrap()
    }

    #[test]
    fn test_from_element() {
        let packet = vcard_get();

        assert_eq!(packet.name(), "iq");
        assert_eq!(packet.namespace(), ns::JABBER_CLIENT);
        assert_eq!(packet.id(), Some("v1"));
        assert_eq!(packet.stanza_type(), Some(&StanzaType::Get));
        assert_eq!(packet.destination_domain(), Some("example.com"));
        assert_eq!(packet.payload().len(), 1);
        assert!(packet.child("vCard").is_some());
        assert_eq!(packet.kind(), StanzaKind::Iq);
    }

    #[test]
    fn test_from_element_rejects_bad_jid() {
        let element: Element = "<iq xmlns='jabber:client' type='get' id='x' to='@@'/>"
            .parse()
            .unwrap();
        assert!(matches!(
            Packet::from_element(&element),
            Err(XmppError::JidMalformed(_))
        ));
    }

    #[test]
    fn test_ok_result_depth_one_keeps_empty_wrapper() {
        let packet = vcard_get();
        let result = packet.ok_result(None, 1);

        assert_eq!(result.stanza_type(), Some(&StanzaType::Result));
        assert_eq!(result.id(), Some("v1"));
        assert_eq!(result.stanza_to(), packet.stanza_from());
        assert_eq!(result.stanza_from(), packet.stanza_to());

        let wrapper = &result.payload()[0];
        assert_eq!(wrapper.name(), "vCard");
        assert_eq!(wrapper.ns(), ns::VCARD);
        assert!(wrapper.children().next().is_none());
    }

    #[test]
    fn test_ok_result_depth_zero_is_bare() {
        let result = vcard_get().ok_result(None, 0);
        assert!(result.payload().is_empty());
    }

    #[test]
    fn test_reply_swaps_routing_addresses() {
        let conn: Jid = "c2s@node1/127.0.0.1_5222_1".parse().unwrap();
        let packet = vcard_get().with_packet_from(conn.clone());
        let result = packet.ok_result(None, 0);

        assert_eq!(result.packet_to(), Some(&conn));
        assert_eq!(result.packet_from(), None);
    }

    #[test]
    fn test_copy_element_only() {
        let conn: Jid = "c2s@node1/conn".parse().unwrap();
        let packet = vcard_get().with_packet_from(conn.clone()).with_packet_to(conn);
        let copy = packet.copy_element_only();

        assert!(copy.packet_to().is_none());
        assert!(copy.packet_from().is_none());
        assert_eq!(copy.to_element(), packet.to_element());
    }

    #[test]
    fn test_to_element_round_trips_addresses() {
        let packet = vcard_get();
        let element = packet.to_element();

        assert_eq!(element.attr("type"), Some("get"));
        assert_eq!(element.attr("to"), Some("bob@example.com"));
        assert_eq!(element.attr("from"), Some("alice@example.com/home"));
        assert!(element.get_child("vCard", ns::VCARD).is_some());
    }
}
