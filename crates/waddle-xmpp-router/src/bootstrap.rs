//! Wiring of the routing core from settings.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::RouterSettings;
use crate::dispatch::{DispatchEngine, EngineConfig};
use crate::error::XmppError;
use crate::processor::{ProcessorRegistry, XmppProcessor};
use crate::processors::default_processors;
use crate::repository::{MemoryUserRepository, UserRepository};
use crate::router::{ComponentRouter, ServerComponent};
use crate::session::Session;
use crate::stats::{RouterStatistics, StatRecord};
use crate::vhost::build_repository;

/// A fully wired router, processor registry and dispatch engine.
pub struct RoutingCore {
    settings: RouterSettings,
    router: Arc<ComponentRouter>,
    processors: Arc<ProcessorRegistry>,
    engine: DispatchEngine,
}

impl RoutingCore {
    /// Build the core with the in-memory user repository and the default
    /// processors.
    pub fn from_settings(settings: RouterSettings) -> Result<Self, XmppError> {
        let repository = Arc::new(MemoryUserRepository::new(settings.users.auto_create_user));
        Self::with_repository(settings, repository)
    }

    /// Build the core over an externally provided user repository.
    pub fn with_repository(
        settings: RouterSettings,
        repository: Arc<dyn UserRepository>,
    ) -> Result<Self, XmppError> {
        settings.validate()?;
        settings.log_config();

        let vhosts = build_repository(&settings.vhosts)?;
        let stats = Arc::new(RouterStatistics::default());
        let router = ComponentRouter::new(vhosts, stats, &settings.default_hostname);
        let server_jid = router.component_address(&settings.session_manager_name)?;

        let processors = Arc::new(ProcessorRegistry::new());
        let engine = DispatchEngine::new(
            EngineConfig { server_jid },
            Arc::clone(&router),
            Arc::clone(&processors),
            repository,
        );

        let core = Self {
            settings,
            router,
            processors,
            engine,
        };
        for processor in default_processors() {
            core.register_processor(processor)?;
        }

        info!(
            processors = core.processors.len(),
            server_jid = %core.engine.server_jid(),
            "Routing core ready"
        );
        Ok(core)
    }

    /// Register a component. Outside strict mode a rejected registration is
    /// logged and skipped.
    pub fn register_component(&self, component: Arc<dyn ServerComponent>) -> Result<(), XmppError> {
        let name = component.name().to_string();
        self.tolerate(self.router.register(component), &name)
    }

    /// Register a processor. Outside strict mode a rejected registration is
    /// logged and skipped.
    pub fn register_processor(&self, processor: Arc<dyn XmppProcessor>) -> Result<(), XmppError> {
        let id = processor.id().to_string();
        self.tolerate(self.processors.register(processor), &id)
    }

    fn tolerate(&self, result: Result<(), XmppError>, name: &str) -> Result<(), XmppError> {
        match result {
            Err(e) if e.is_configuration_error() && !self.settings.strict_registration => {
                warn!(name = %name, error = %e, "Registration rejected, keeping previous set");
                Ok(())
            }
            other => other,
        }
    }

    /// Create a session for a new client connection on `domain`.
    pub fn new_session(&self, connection_id: Option<jid::Jid>, domain: &str) -> Arc<Session> {
        Arc::new(Session::new(
            connection_id,
            domain,
            Arc::clone(self.engine.repository()),
            self.router.resolver(),
        ))
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    pub fn router(&self) -> &Arc<ComponentRouter> {
        &self.router
    }

    pub fn processors(&self) -> &Arc<ProcessorRegistry> {
        &self.processors
    }

    pub fn engine(&self) -> &DispatchEngine {
        &self.engine
    }

    /// Statistics for external monitoring.
    pub fn statistics(&self) -> Vec<StatRecord> {
        self.router.stats().snapshot(self.router.vhosts().size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ns;
    use crate::processors::VCardTemp;
    use crate::vhost::VHostItem;

    fn settings(strict: bool) -> RouterSettings {
        let mut settings = RouterSettings {
            default_hostname: "example.com".to_string(),
            strict_registration: strict,
            ..RouterSettings::default()
        };
        settings.vhosts.items.push(VHostItem::new("example.com"));
        settings
    }

    #[test]
    fn test_default_wiring() {
        let core = RoutingCore::from_settings(settings(false)).unwrap();

        assert_eq!(core.processors().ids(), vec![ns::SESSION, ns::VCARD]);
        assert_eq!(core.engine().server_jid().to_string(), "sess-man@example.com");
        assert_eq!(core.statistics()[0].value, 1);
    }

    #[test]
    fn test_duplicate_processor_tolerated_outside_strict_mode() {
        let core = RoutingCore::from_settings(settings(false)).unwrap();
        assert!(core.register_processor(Arc::new(VCardTemp)).is_ok());
        assert_eq!(core.processors().len(), 2);
    }

    #[test]
    fn test_duplicate_processor_fails_in_strict_mode() {
        let core = RoutingCore::from_settings(settings(true)).unwrap();
        assert!(matches!(
            core.register_processor(Arc::new(VCardTemp)),
            Err(XmppError::DuplicateProcessorId(_))
        ));
    }

    #[test]
    fn test_new_session_sees_router() {
        let core = RoutingCore::from_settings(settings(false)).unwrap();
        let session = core.new_session(None, "example.com");
        assert!(session.is_local_domain("example.com", false));
        assert!(!session.is_authorized());
    }
}
