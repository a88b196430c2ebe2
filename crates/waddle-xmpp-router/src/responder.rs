//! Error responder: maps dispatch failures to stanza errors.
//!
//! Every per-stanza failure ends up here. Failures with a protocol meaning
//! become an `<error/>` reply to the requester; the rest (missing connection,
//! unroutable domain, configuration problems) are logged by the caller and
//! dropped.

use minidom::Element;
use tracing::debug;

use crate::error::{StanzaErrorCondition, StanzaErrorType, XmppError};
use crate::ns;
use crate::packet::Packet;
use crate::types::StanzaType;

/// Protocol-level error derived from an [`XmppError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StanzaFailure {
    pub condition: StanzaErrorCondition,
    pub error_type: StanzaErrorType,
    pub text: Option<String>,
}

impl StanzaFailure {
    fn new(condition: StanzaErrorCondition, text: Option<String>) -> Self {
        Self {
            condition,
            error_type: condition.default_type(),
            text,
        }
    }
}

/// Map an error to the stanza error it surfaces as, if any.
pub fn classify(error: &XmppError) -> Option<StanzaFailure> {
    match error {
        XmppError::UserNotFound(_) => Some(StanzaFailure::new(
            StanzaErrorCondition::ItemNotFound,
            Some("User not found".to_string()),
        )),
        XmppError::NotAuthorized => Some(StanzaFailure::new(
            StanzaErrorCondition::NotAuthorized,
            Some("You must authorize session first.".to_string()),
        )),
        XmppError::Storage(_) => Some(StanzaFailure::new(
            StanzaErrorCondition::InternalServerError,
            Some("Database access problem, please contact administrator.".to_string()),
        )),
        XmppError::UserExists(_) => Some(StanzaFailure::new(StanzaErrorCondition::Conflict, None)),
        XmppError::JidMalformed(_) => {
            Some(StanzaFailure::new(StanzaErrorCondition::JidMalformed, None))
        }
        XmppError::XmlParse(msg) => Some(StanzaFailure::new(
            StanzaErrorCondition::BadRequest,
            Some(msg.clone()),
        )),
        XmppError::Stanza {
            condition,
            error_type,
            text,
        } => Some(StanzaFailure {
            condition: *condition,
            error_type: *error_type,
            text: text.clone(),
        }),
        XmppError::NoConnectionId
        | XmppError::UnknownDomain(_)
        | XmppError::NoHandler(_)
        | XmppError::DuplicateProcessorId(_)
        | XmppError::DuplicateComponentName(_)
        | XmppError::Config(_) => None,
    }
}

/// Build the error reply for a failed request, if the failure has one.
///
/// The reply is routed back along the request's connection.
pub fn respond_to(packet: &Packet, error: &XmppError) -> Option<Packet> {
    let failure = classify(error)?;
    error_response(
        packet,
        failure.condition,
        failure.error_type,
        failure.text.as_deref(),
        true,
    )
}

/// Build an error stanza answering `packet`.
///
/// Addresses are swapped and the type set to `error`. With
/// `include_original` the request children are echoed before the
/// `<error/>` element. Error stanzas are never answered; `None` is returned
/// for them.
pub fn error_response(
    packet: &Packet,
    condition: StanzaErrorCondition,
    error_type: StanzaErrorType,
    text: Option<&str>,
    include_original: bool,
) -> Option<Packet> {
    if packet.is_error() {
        debug!(id = ?packet.id(), "Not answering an error stanza with another error");
        return None;
    }

    let mut payload: Vec<Element> = if include_original {
        packet.payload().to_vec()
    } else {
        Vec::new()
    };
    payload.push(build_error_element(condition, error_type, text));

    Some(packet.reply(StanzaType::Error, payload))
}

/// Build the `<error/>` child element.
pub fn build_error_element(
    condition: StanzaErrorCondition,
    error_type: StanzaErrorType,
    text: Option<&str>,
) -> Element {
    let mut builder = Element::builder("error", ns::JABBER_CLIENT)
        .attr("type", error_type.as_str())
        .append(Element::builder(condition.as_str(), ns::STANZAS).build());

    if let Some(text) = text {
        builder = builder.append(
            Element::builder("text", ns::STANZAS)
                .attr("xml:lang", "en")
                .append(text)
                .build(),
        );
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jid::Jid;

    fn request(stanza_type: StanzaType) -> Packet {
        let from: Jid = "alice@example.com/home".parse().unwrap();
        let to: Jid = "example.com".parse().unwrap();
        let payload = Element::builder("vCard", ns::VCARD).build();
        Packet::iq("r1", stanza_type, Some(from), Some(to), Some(payload))
    }

    #[test]
    fn test_classify_mappings() {
        let cases = [
            (XmppError::user_not_found("bob"), StanzaErrorCondition::ItemNotFound),
            (XmppError::NotAuthorized, StanzaErrorCondition::NotAuthorized),
            (XmppError::storage("disk full"), StanzaErrorCondition::InternalServerError),
            (XmppError::bad_request(None), StanzaErrorCondition::BadRequest),
        ];
        for (error, condition) in cases {
            assert_eq!(classify(&error).map(|f| f.condition), Some(condition));
        }

        assert_eq!(
            classify(&XmppError::NotAuthorized).unwrap().error_type,
            StanzaErrorType::Auth
        );
    }

    #[test]
    fn test_classify_drops_non_protocol_errors() {
        assert!(classify(&XmppError::NoConnectionId).is_none());
        assert!(classify(&XmppError::UnknownDomain("x.org".into())).is_none());
        assert!(classify(&XmppError::NoHandler("example.com".into())).is_none());
        assert!(classify(&XmppError::DuplicateProcessorId("p".into())).is_none());
    }

    #[test]
    fn test_error_response_shape() {
        let packet = request(StanzaType::Set);
        let reply = respond_to(&packet, &XmppError::NotAuthorized).unwrap();

        assert!(reply.is_error());
        assert_eq!(reply.id(), Some("r1"));
        assert_eq!(reply.stanza_to(), packet.stanza_from());

        let error = reply.child("error").unwrap();
        assert_eq!(error.attr("type"), Some("auth"));
        assert!(error.get_child("not-authorized", ns::STANZAS).is_some());
        assert_eq!(
            error.get_child("text", ns::STANZAS).map(|t| t.text()),
            Some("You must authorize session first.".to_string())
        );
        // original payload echoed ahead of the error
        assert_eq!(reply.payload()[0].name(), "vCard");
    }

    #[test]
    fn test_error_not_answered_with_error() {
        let packet = request(StanzaType::Error);
        assert!(respond_to(&packet, &XmppError::storage("x")).is_none());
    }
}
