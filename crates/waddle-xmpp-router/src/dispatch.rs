//! Stanza dispatch engine.
//!
//! For each inbound stanza the engine picks one of five processing paths
//! from the session state and destination, then runs every matching
//! processor along that path.
//!
//! | Session | From its connection | Destination | Path |
//! |---|---|---|---|
//! | any | any | the engine's own identity | server session |
//! | no | - | local | null session |
//! | no | - | remote | forwarded to non-local components |
//! | yes | yes | none, own account or a local domain | from user to server |
//! | yes | yes | anything else | from user out (authorized only) |
//! | yes | no | - | to user |
//!
//! A local destination also gets a copy for every component the router
//! resolves for it. A remote destination no processor claims is forwarded to
//! the non-local components whether or not a session exists.
//!
//! Every matched processor runs into its own buffer. A failure replaces
//! that processor's output with the matching error reply and never affects
//! the other processors.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use jid::Jid;
use tracing::{debug, instrument, warn};

use crate::error::XmppError;
use crate::metrics;
use crate::packet::Packet;
use crate::processor::{ProcessorRegistry, XmppProcessor};
use crate::repository::UserRepository;
use crate::responder;
use crate::router::{ComponentRouter, DomainResolver, LocalResolution};
use crate::session::Session;

/// Processing path chosen for a stanza.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingPath {
    NullSession,
    FromUserToServer,
    FromUserOut,
    ToUser,
    ServerSession,
}

impl ProcessingPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingPath::NullSession => "null_session",
            ProcessingPath::FromUserToServer => "from_user_to_server",
            ProcessingPath::FromUserOut => "from_user_out",
            ProcessingPath::ToUser => "to_user",
            ProcessingPath::ServerSession => "server_session",
        }
    }
}

impl fmt::Display for ProcessingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a dispatched stanza.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Matched processors ran along the path
    Processed(ProcessingPath),
    /// Copies were handed to components and no processor ran
    Forwarded,
    /// The engine answered with an error without running processors
    Rejected(XmppError),
    /// Nothing could handle the stanza (`UnknownDomain` or `NoHandler`)
    Dropped(XmppError),
}

/// Result of dispatching one stanza.
#[derive(Debug)]
pub struct DispatchReport {
    pub outcome: DispatchOutcome,
    /// Components a copy was addressed to: the resolved local components,
    /// or the non-local components for a remote destination
    pub components: Vec<String>,
    /// Processors that ran, in order
    pub processors: Vec<String>,
    /// Outbound queue
    pub results: Vec<Packet>,
}

impl DispatchReport {
    fn new(outcome: DispatchOutcome) -> Self {
        Self {
            outcome,
            components: Vec::new(),
            processors: Vec::new(),
            results: Vec::new(),
        }
    }

    /// Path taken, if processors ran.
    pub fn path(&self) -> Option<ProcessingPath> {
        match self.outcome {
            DispatchOutcome::Processed(path) => Some(path),
            _ => None,
        }
    }
}

/// Where a stanza goes besides the processors.
#[derive(Debug, Default)]
struct Route {
    /// Local components resolved for the destination
    components: Vec<String>,
    /// Copies addressed to those components
    copies: Vec<Packet>,
    /// Destination is neither local nor a component domain
    remote: bool,
}

impl Route {
    fn remote() -> Self {
        Self {
            remote: true,
            ..Self::default()
        }
    }
}

/// Dispatch engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The engine's own component identity, e.g. `sess-man@example.com`
    pub server_jid: Jid,
}

/// Runs inbound stanzas through the processor registry.
pub struct DispatchEngine {
    config: EngineConfig,
    router: Arc<ComponentRouter>,
    processors: Arc<ProcessorRegistry>,
    repository: Arc<dyn UserRepository>,
}

impl DispatchEngine {
    pub fn new(
        config: EngineConfig,
        router: Arc<ComponentRouter>,
        processors: Arc<ProcessorRegistry>,
        repository: Arc<dyn UserRepository>,
    ) -> Self {
        debug!(server_jid = %config.server_jid, "Dispatch engine initialized");
        Self {
            config,
            router,
            processors,
            repository,
        }
    }

    pub fn server_jid(&self) -> &Jid {
        &self.config.server_jid
    }

    pub fn router(&self) -> &Arc<ComponentRouter> {
        &self.router
    }

    pub fn processors(&self) -> &Arc<ProcessorRegistry> {
        &self.processors
    }

    pub fn repository(&self) -> &Arc<dyn UserRepository> {
        &self.repository
    }

    /// Dispatch one stanza.
    ///
    /// Per-stanza failures never escape: they end up as error replies in
    /// the report or as a `Dropped` outcome.
    #[instrument(
        skip(self, packet, session),
        fields(id = ?packet.id(), kind = %packet.kind(), to = ?packet.stanza_to())
    )]
    pub async fn dispatch(&self, packet: &Packet, session: Option<Arc<Session>>) -> DispatchReport {
        let started = Instant::now();
        let session = session.as_deref();

        // one dispatch per session at a time
        let _guard = match session {
            Some(session) => Some(session.lock_dispatch().await),
            None => None,
        };

        let report = self.dispatch_locked(packet, session).await;

        let path = report.path().map(|p| p.as_str()).unwrap_or("none");
        self.router
            .stats()
            .record_dispatch(&packet.kind().to_string(), path);
        metrics::record_dispatch_latency(started.elapsed().as_secs_f64() * 1000.0, path);

        report
    }

    async fn dispatch_locked(&self, packet: &Packet, session: Option<&Session>) -> DispatchReport {
        if self.is_addressed_to_engine(packet) {
            return self
                .run_processors(packet, ProcessingPath::ServerSession, session, Route::default())
                .await;
        }

        let local = packet
            .destination_domain()
            .map(|domain| self.router.is_local_or_component(domain));

        let Some(session) = session else {
            return match local {
                Some(false) => self.forward_non_local(packet),
                _ => {
                    let route = self.route_local(packet);
                    self.run_processors(packet, ProcessingPath::NullSession, None, route)
                        .await
                }
            };
        };

        let route = match local {
            Some(true) => self.route_local(packet),
            Some(false) => Route::remote(),
            None => Route::default(),
        };

        if !self.is_from_session(packet, session) {
            return self
                .run_processors(packet, ProcessingPath::ToUser, Some(session), route)
                .await;
        }

        if self.is_to_own_server(packet, session) {
            return self
                .run_processors(packet, ProcessingPath::FromUserToServer, Some(session), route)
                .await;
        }

        if !session.is_authorized() {
            debug!("Unauthorized session sending outside its own account");
            let error = XmppError::NotAuthorized;
            let mut report = DispatchReport::new(DispatchOutcome::Rejected(XmppError::NotAuthorized));
            report.components = route.components;
            report.results.extend(responder::respond_to(packet, &error));
            return report;
        }

        self.run_processors(packet, ProcessingPath::FromUserOut, Some(session), route)
            .await
    }

    fn is_addressed_to_engine(&self, packet: &Packet) -> bool {
        packet
            .stanza_to()
            .is_some_and(|to| self.is_engine(to))
    }

    fn is_engine(&self, jid: &Jid) -> bool {
        jid.to_bare() == self.config.server_jid.to_bare()
    }

    fn is_from_session(&self, packet: &Packet, session: &Session) -> bool {
        match (packet.packet_from(), session.connection_id()) {
            (Some(from), Ok(connection_id)) => *from == connection_id,
            _ => false,
        }
    }

    /// No destination, the user's own account, or a bare local domain.
    fn is_to_own_server(&self, packet: &Packet, session: &Session) -> bool {
        let Some(to) = packet.stanza_to() else {
            return true;
        };

        if session.is_user_id(&to.to_bare()) {
            return true;
        }

        to.node().is_none() && to.is_bare() && session.is_local_domain(to.domain().as_str(), false)
    }

    /// Resolve the local components for the destination and address a copy
    /// to each of them. The engine's own identity gets no copy.
    fn route_local(&self, packet: &Packet) -> Route {
        let mut route = Route::default();
        let Some(domain) = packet.destination_domain() else {
            return route;
        };

        let components = match self.router.resolve_local(domain) {
            LocalResolution::Components(components) => components,
            LocalResolution::NoHandler => {
                debug!(domain = %domain, "No component handles local domain");
                return route;
            }
            LocalResolution::NotLocal => return route,
        };

        for component in components {
            match self.router.component_address(component.name()) {
                Ok(address) if self.is_engine(&address) => {}
                Ok(address) => {
                    route
                        .copies
                        .push(packet.copy_element_only().with_packet_to(address));
                    route.components.push(component.name().to_string());
                }
                Err(e) => warn!(
                    component = %component.name(),
                    error = %e,
                    "Component name is not addressable, skipping"
                ),
            }
        }

        route
    }

    fn forward_non_local(&self, packet: &Packet) -> DispatchReport {
        let domain = packet.destination_domain().unwrap_or_default().to_string();
        let components = self.router.resolve_non_local();

        if components.is_empty() {
            warn!(domain = %domain, "No handler for non-local domain, dropping stanza");
            return DispatchReport::new(DispatchOutcome::Dropped(XmppError::UnknownDomain(domain)));
        }

        let mut report = DispatchReport::new(DispatchOutcome::Forwarded);
        for component in components {
            match self.router.component_address(component.name()) {
                Ok(address) => {
                    report
                        .results
                        .push(packet.copy_element_only().with_packet_to(address));
                    report.components.push(component.name().to_string());
                }
                Err(e) => warn!(
                    component = %component.name(),
                    error = %e,
                    "Component name is not addressable, skipping"
                ),
            }
        }

        debug!(domain = %domain, components = ?report.components, "Forwarded to non-local components");
        report
    }

    async fn run_processors(
        &self,
        packet: &Packet,
        path: ProcessingPath,
        session: Option<&Session>,
        route: Route,
    ) -> DispatchReport {
        let matching = self.processors.matching(packet);
        if matching.is_empty() {
            if !route.copies.is_empty() {
                debug!(components = ?route.components, "Delivered to local components only");
                let mut report = DispatchReport::new(DispatchOutcome::Forwarded);
                report.components = route.components;
                report.results = route.copies;
                return report;
            }
            if route.remote {
                return self.forward_non_local(packet);
            }

            let target = packet
                .destination_domain()
                .unwrap_or(packet.name())
                .to_string();
            debug!(path = %path, target = %target, "No processor matched, dropping stanza");
            let mut report = DispatchReport::new(DispatchOutcome::Dropped(XmppError::NoHandler(target)));
            report.components = route.components;
            return report;
        }

        let mut report = DispatchReport::new(DispatchOutcome::Processed(path));
        report.components = route.components;
        report.results = route.copies;

        for processor in matching {
            let mut buffer = Vec::new();
            let outcome = self
                .invoke(processor.as_ref(), packet, path, session, &mut buffer)
                .await;

            match outcome {
                Ok(()) => report.results.append(&mut buffer),
                Err(e) => self.handle_failure(processor.id(), packet, e, &mut report.results),
            }
            report.processors.push(processor.id().to_string());
        }

        debug!(
            path = %path,
            processors = ?report.processors,
            results = report.results.len(),
            "Stanza dispatched"
        );
        report
    }

    async fn invoke(
        &self,
        processor: &dyn XmppProcessor,
        packet: &Packet,
        path: ProcessingPath,
        session: Option<&Session>,
        results: &mut Vec<Packet>,
    ) -> Result<(), XmppError> {
        let repository = self.repository.as_ref();

        match (path, session) {
            (ProcessingPath::ServerSession, session) => {
                processor
                    .process_server_session(packet, session, repository, results)
                    .await
            }
            (ProcessingPath::NullSession, _) | (_, None) => {
                processor
                    .process_null_session(packet, repository, results)
                    .await
            }
            (ProcessingPath::ToUser, session) => {
                processor
                    .process_to_user(packet, session, repository, results)
                    .await
            }
            (ProcessingPath::FromUserToServer, Some(session)) => {
                let connection_id = session.connection_id()?;
                processor
                    .process_from_user_to_server(&connection_id, packet, session, repository, results)
                    .await
            }
            (ProcessingPath::FromUserOut, Some(session)) => {
                let connection_id = session.connection_id()?;
                processor
                    .process_from_user_out(&connection_id, packet, session, repository, results)
                    .await
            }
        }
    }

    fn handle_failure(
        &self,
        processor: &str,
        packet: &Packet,
        error: XmppError,
        results: &mut Vec<Packet>,
    ) {
        let failure = responder::classify(&error);
        let condition = failure
            .as_ref()
            .map(|f| f.condition.as_str())
            .unwrap_or("dropped");
        self.router.stats().record_dispatch_error(processor, condition);

        match responder::respond_to(packet, &error) {
            Some(reply) => {
                debug!(processor = %processor, error = %error, "Processor failed, answering with error");
                results.push(reply);
            }
            None if matches!(error, XmppError::NoConnectionId) => {
                warn!(
                    processor = %processor,
                    id = ?packet.id(),
                    "No connection id for session, this should not happen; dropping result"
                );
            }
            None => {
                warn!(processor = %processor, error = %error, "Processor failed, dropping stanza");
            }
        }
    }
}

impl fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("server_jid", &self.config.server_jid)
            .field("processors", &self.processors.ids())
            .finish()
    }
}
