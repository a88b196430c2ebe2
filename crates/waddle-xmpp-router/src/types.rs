//! Common stanza types.

use std::fmt;

/// Top-level stanza element, used for metrics and tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaKind {
    /// Message stanza
    Message,
    /// Presence stanza
    Presence,
    /// IQ (info/query) stanza
    Iq,
    /// Anything else (stream-level elements)
    Other,
}

impl StanzaKind {
    /// Classify a top-level element name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "message" => StanzaKind::Message,
            "presence" => StanzaKind::Presence,
            "iq" => StanzaKind::Iq,
            _ => StanzaKind::Other,
        }
    }
}

impl fmt::Display for StanzaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StanzaKind::Message => write!(f, "message"),
            StanzaKind::Presence => write!(f, "presence"),
            StanzaKind::Iq => write!(f, "iq"),
            StanzaKind::Other => write!(f, "other"),
        }
    }
}

/// Value of a stanza's `type` attribute.
///
/// An absent attribute is modelled as `Option::None` on the packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StanzaType {
    Get,
    Set,
    Result,
    Error,
    /// Message and presence types (`chat`, `unavailable`, ...)
    Other(String),
}

impl StanzaType {
    /// Parse a `type` attribute value.
    pub fn parse(value: &str) -> Self {
        match value {
            "get" => StanzaType::Get,
            "set" => StanzaType::Set,
            "result" => StanzaType::Result,
            "error" => StanzaType::Error,
            other => StanzaType::Other(other.to_string()),
        }
    }

    /// Attribute value for this type.
    pub fn as_str(&self) -> &str {
        match self {
            StanzaType::Get => "get",
            StanzaType::Set => "set",
            StanzaType::Result => "result",
            StanzaType::Error => "error",
            StanzaType::Other(value) => value,
        }
    }
}

impl fmt::Display for StanzaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
