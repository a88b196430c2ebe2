//! Namespace URIs used by the routing core and its processors.

/// XMPP client namespace
pub const JABBER_CLIENT: &str = "jabber:client";
/// Session establishment namespace (RFC 3921)
pub const SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";
/// Stanza error namespace
pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";
/// vcard-temp namespace (XEP-0054)
pub const VCARD: &str = "vcard-temp";
