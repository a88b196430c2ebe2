//! Component routing.
//!
//! The [`ComponentRouter`] decides which server components receive a copy of
//! a stanza addressed to a given domain. It combines the vhost registry with
//! the set of live components, each of which claims local, non-local and/or
//! name-subdomain traffic.
//!
//! # Resolution
//!
//! For a local vhost:
//! 1. The components bound explicitly to the vhost, in declared order,
//!    skipping names that are not registered
//! 2. If none resolve, every generic local handler in registration order
//! 3. If that set is empty too, [`LocalResolution::NoHandler`]
//!
//! For an unknown domain `name.base`, the component registered as `name`
//! receives it when it handles name subdomains and `base` is a local vhost.
//! Only one level is considered.
//!
//! # Concurrency
//!
//! The routing table is an immutable snapshot behind an [`ArcSwap`]. Readers
//! load it without locking; a registration publishes a whole new table so a
//! reader sees a component in all of its sets or in none.

mod component;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use dashmap::DashSet;
use jid::{BareJid, Jid};
use tracing::{debug, info, instrument, warn};

pub use component::{Capabilities, DomainResolver, ServerComponent};

use crate::error::XmppError;
use crate::metrics;
use crate::stats::RouterStatistics;
use crate::vhost::{normalize_domain, VHostRepository};

/// Outcome of resolving a destination domain.
#[derive(Debug, Clone)]
pub enum LocalResolution {
    /// Components that must receive a copy, in routing order
    Components(Vec<Arc<dyn ServerComponent>>),
    /// The domain is local but nothing is registered to handle it
    NoHandler,
    /// The domain is not hosted here
    NotLocal,
}

impl LocalResolution {
    /// Whether the domain was recognised as local.
    pub fn is_local(&self) -> bool {
        !matches!(self, LocalResolution::NotLocal)
    }

    /// Names of the resolved components, empty unless `Components`.
    pub fn component_names(&self) -> Vec<String> {
        match self {
            LocalResolution::Components(components) => {
                components.iter().map(|c| c.name().to_string()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Immutable routing table snapshot.
#[derive(Clone, Default)]
struct RoutingTable {
    components: HashMap<String, Arc<dyn ServerComponent>>,
    local: Vec<Arc<dyn ServerComponent>>,
    non_local: Vec<Arc<dyn ServerComponent>>,
    name_subdomains: Vec<Arc<dyn ServerComponent>>,
}

impl RoutingTable {
    /// Insert a component. Returns `Ok(false)` when this exact component is
    /// already registered.
    fn insert(&mut self, component: &Arc<dyn ServerComponent>) -> Result<bool, XmppError> {
        let name = component.name();
        if let Some(existing) = self.components.get(name) {
            if Arc::ptr_eq(existing, component) {
                return Ok(false);
            }
            return Err(XmppError::DuplicateComponentName(name.to_string()));
        }

        let caps = component.capabilities();
        self.components.insert(name.to_string(), Arc::clone(component));
        if caps.local_domains {
            self.local.push(Arc::clone(component));
        }
        if caps.non_local_domains {
            self.non_local.push(Arc::clone(component));
        }
        if caps.name_subdomains {
            self.name_subdomains.push(Arc::clone(component));
        }

        Ok(true)
    }

    fn remove(&mut self, name: &str) -> Option<Arc<dyn ServerComponent>> {
        let removed = self.components.remove(name)?;
        for set in [&mut self.local, &mut self.non_local, &mut self.name_subdomains] {
            set.retain(|c| !Arc::ptr_eq(c, &removed));
        }
        Some(removed)
    }

    /// Component owning `domain` as a name subdomain, if `base_is_local`
    /// confirms the suffix.
    fn name_subdomain_owner(
        &self,
        domain: &str,
        base_is_local: impl FnOnce(&str) -> bool,
    ) -> Option<Arc<dyn ServerComponent>> {
        let (name, base) = domain.split_once('.')?;
        if name.is_empty() {
            return None;
        }
        let component = self.components.get(name)?;
        if component.capabilities().name_subdomains && base_is_local(base) {
            Some(Arc::clone(component))
        } else {
            None
        }
    }
}

/// Live routing table for vhosts and server components.
pub struct ComponentRouter {
    vhosts: Arc<dyn VHostRepository>,
    table: ArcSwap<RoutingTable>,
    component_domains: DashSet<String>,
    stats: Arc<RouterStatistics>,
    default_hostname: String,
    self_ref: Weak<ComponentRouter>,
}

impl ComponentRouter {
    /// Create a router over the given vhost repository.
    pub fn new(
        vhosts: Arc<dyn VHostRepository>,
        stats: Arc<RouterStatistics>,
        default_hostname: &str,
    ) -> Arc<Self> {
        info!(
            vhosts = vhosts.size(),
            default_hostname = %default_hostname,
            "Component router initialized"
        );

        Arc::new_cyclic(|self_ref| Self {
            vhosts,
            table: ArcSwap::from_pointee(RoutingTable::default()),
            component_domains: DashSet::new(),
            stats,
            default_hostname: normalize_domain(default_hostname),
            self_ref: self_ref.clone(),
        })
    }

    /// Register a component.
    ///
    /// Registering the same component twice is a no-op. A different
    /// component under a taken name is rejected and the table is left as
    /// it was. The component's [`on_registered`](ServerComponent::on_registered)
    /// hook runs after the new table is published.
    #[instrument(skip(self, component), fields(component = %component.name()))]
    pub fn register(&self, component: Arc<dyn ServerComponent>) -> Result<(), XmppError> {
        let mut outcome = Ok(false);
        let mut size = 0;
        self.table.rcu(|table| {
            let mut next = RoutingTable::clone(table);
            outcome = next.insert(&component);
            size = next.components.len();
            next
        });

        match outcome {
            Ok(true) => {
                info!(capabilities = ?component.capabilities(), "Component registered");
                metrics::record_component_count(size as i64);
                component.on_registered(self.resolver());
                Ok(())
            }
            Ok(false) => {
                debug!("Component already registered");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Component registration rejected");
                Err(e)
            }
        }
    }

    /// Remove a component from every routing set.
    #[instrument(skip(self))]
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn ServerComponent>> {
        let mut removed = None;
        let mut size = 0;
        self.table.rcu(|table| {
            let mut next = RoutingTable::clone(table);
            removed = next.remove(name);
            size = next.components.len();
            next
        });

        if removed.is_some() {
            info!("Component unregistered");
            metrics::record_component_count(size as i64);
        }
        removed
    }

    /// Resolve the components responsible for a destination domain.
    #[instrument(skip(self), level = "debug")]
    pub fn resolve_local(&self, domain: &str) -> LocalResolution {
        self.stats.record_local_resolution();

        let table = self.table.load();
        let Some(vhost) = self.vhosts.get(domain) else {
            let domain = normalize_domain(domain);
            return match table.name_subdomain_owner(&domain, |base| self.is_local(base)) {
                Some(component) => LocalResolution::Components(vec![component]),
                None => LocalResolution::NotLocal,
            };
        };

        let mut results: Vec<Arc<dyn ServerComponent>> = Vec::new();
        for name in &vhost.components {
            match table.components.get(name) {
                Some(component) if !results.iter().any(|c| Arc::ptr_eq(c, component)) => {
                    results.push(Arc::clone(component));
                }
                Some(_) => {}
                None => debug!(component = %name, "Explicit component not registered"),
            }
        }

        if results.is_empty() {
            results.extend(table.local.iter().cloned());
        }

        if results.is_empty() {
            LocalResolution::NoHandler
        } else {
            LocalResolution::Components(results)
        }
    }

    /// Components handling domains this server does not host.
    pub fn resolve_non_local(&self) -> Vec<Arc<dyn ServerComponent>> {
        self.stats.record_non_local_resolution();
        self.table.load().non_local.clone()
    }

    /// Mark a domain as owned by an external component.
    pub fn add_component_domain(&self, domain: &str) {
        let domain = normalize_domain(domain);
        debug!(domain = %domain, "Component domain added");
        self.component_domains.insert(domain);
    }

    pub fn remove_component_domain(&self, domain: &str) {
        let domain = normalize_domain(domain);
        if self.component_domains.remove(&domain).is_some() {
            debug!(domain = %domain, "Component domain removed");
        }
    }

    /// Look up a registered component by name.
    pub fn component(&self, name: &str) -> Option<Arc<dyn ServerComponent>> {
        self.table.load().components.get(name).cloned()
    }

    /// Names of all registered components, sorted.
    pub fn component_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.load().components.keys().cloned().collect();
        names.sort();
        names
    }

    /// Generic local handlers, in registration order.
    pub fn local_handlers(&self) -> Vec<Arc<dyn ServerComponent>> {
        self.table.load().local.clone()
    }

    /// Routing address of a component: `name@default-hostname`.
    pub fn component_address(&self, name: &str) -> Result<Jid, XmppError> {
        Ok(Jid::from(BareJid::new(&format!(
            "{name}@{}",
            self.default_hostname
        ))?))
    }

    pub fn default_hostname(&self) -> &str {
        &self.default_hostname
    }

    pub fn vhosts(&self) -> &Arc<dyn VHostRepository> {
        &self.vhosts
    }

    pub fn stats(&self) -> &Arc<RouterStatistics> {
        &self.stats
    }

    /// Query handle that does not keep the router alive.
    pub fn resolver(&self) -> Arc<dyn DomainResolver> {
        Arc::new(RouterHandle(self.self_ref.clone()))
    }
}

impl DomainResolver for ComponentRouter {
    fn is_local(&self, domain: &str) -> bool {
        self.stats.record_is_local_check();
        self.vhosts.contains(domain)
    }

    fn is_local_or_component(&self, domain: &str) -> bool {
        if self.is_local(domain) {
            return true;
        }

        let domain = normalize_domain(domain);
        if self.component_domains.contains(&domain) {
            return true;
        }

        self.table
            .load()
            .name_subdomain_owner(&domain, |base| self.is_local(base))
            .is_some()
    }

    fn is_anonymous_enabled(&self, domain: &str) -> bool {
        self.stats.record_anonymous_check();
        self.vhosts
            .get(domain)
            .map(|item| item.anonymous_enabled)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for ComponentRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRouter")
            .field("default_hostname", &self.default_hostname)
            .field("components", &self.component_names())
            .finish()
    }
}

/// Weak reference to a router, given to components at registration.
///
/// Every query answers `false` once the router is gone.
#[derive(Clone)]
pub struct RouterHandle(Weak<ComponentRouter>);

impl DomainResolver for RouterHandle {
    fn is_local(&self, domain: &str) -> bool {
        self.0.upgrade().is_some_and(|router| router.is_local(domain))
    }

    fn is_local_or_component(&self, domain: &str) -> bool {
        self.0
            .upgrade()
            .is_some_and(|router| router.is_local_or_component(domain))
    }

    fn is_anonymous_enabled(&self, domain: &str) -> bool {
        self.0
            .upgrade()
            .is_some_and(|router| router.is_anonymous_enabled(domain))
    }
}
