//! RFC 3921 session establishment.
//!
//! Answers `<iq type='set'><session/></iq>` once the client is authorized
//! and advertises the `<session/>` stream feature until it has done so.

use async_trait::async_trait;
use jid::Jid;
use minidom::Element;
use tracing::debug;

use crate::error::{StanzaErrorCondition, XmppError};
use crate::ns;
use crate::packet::Packet;
use crate::processor::{ElementPath, XmppProcessor};
use crate::repository::UserRepository;
use crate::responder::error_response;
use crate::session::Session;
use crate::types::StanzaType;

/// Session data key set once the session is established.
pub const SESSION_KEY: &str = "Session-Set";

/// Session establishment processor.
#[derive(Debug, Default)]
pub struct SessionBind;

impl SessionBind {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl XmppProcessor for SessionBind {
    fn id(&self) -> &str {
        ns::SESSION
    }

    fn element_paths(&self) -> Vec<ElementPath> {
        vec![ElementPath::new(&["iq", "session"], ns::SESSION)]
    }

    async fn process_from_user_to_server(
        &self,
        _connection_id: &Jid,
        packet: &Packet,
        session: &Session,
        _repository: &dyn UserRepository,
        results: &mut Vec<Packet>,
    ) -> Result<(), XmppError> {
        let reply = if !session.is_authorized() {
            let condition = StanzaErrorCondition::NotAuthorized;
            error_response(
                packet,
                condition,
                condition.default_type(),
                Some("Session is not yet authorized."),
                false,
            )
        } else if packet.stanza_type() == Some(&StanzaType::Set) {
            session.put_session_data(SESSION_KEY, "true");
            debug!(user = ?session.user_jid(), "Session established");
            Some(packet.ok_result(None, 0))
        } else {
            let condition = StanzaErrorCondition::BadRequest;
            error_response(
                packet,
                condition,
                condition.default_type(),
                Some("Session type is incorrect"),
                false,
            )
        };

        results.extend(reply);
        Ok(())
    }

    fn stream_features(&self, session: Option<&Session>) -> Vec<Element> {
        match session {
            Some(session)
                if session.is_authorized() && session.get_session_data(SESSION_KEY).is_none() =>
            {
                vec![Element::builder("session", ns::SESSION).build()]
            }
            _ => Vec::new(),
        }
    }

    fn disco_features(&self, _session: Option<&Session>) -> Vec<String> {
        vec![ns::SESSION.to_string()]
    }
}
