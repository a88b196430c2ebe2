//! Server components and the query interface handed to them.

use std::fmt;
use std::sync::Arc;

/// Which traffic a component claims.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Receives stanzas for local vhosts without explicit components
    pub local_domains: bool,
    /// Receives stanzas for domains this server does not host
    pub non_local_domains: bool,
    /// Owns `<name>.<vhost>` for every local vhost
    pub name_subdomains: bool,
}

impl Capabilities {
    /// No routing claims; reachable only when bound explicitly to a vhost.
    pub const fn none() -> Self {
        Self {
            local_domains: false,
            non_local_domains: false,
            name_subdomains: false,
        }
    }

    pub const fn local() -> Self {
        Self {
            local_domains: true,
            ..Self::none()
        }
    }

    pub const fn non_local() -> Self {
        Self {
            non_local_domains: true,
            ..Self::none()
        }
    }

    pub const fn name_subdomains() -> Self {
        Self {
            name_subdomains: true,
            ..Self::none()
        }
    }

    pub const fn with_local(mut self) -> Self {
        self.local_domains = true;
        self
    }

    pub const fn with_non_local(mut self) -> Self {
        self.non_local_domains = true;
        self
    }

    pub const fn with_name_subdomains(mut self) -> Self {
        self.name_subdomains = true;
        self
    }
}

/// Narrow routing queries available to components and sessions.
pub trait DomainResolver: Send + Sync {
    /// Whether the domain is a configured vhost.
    fn is_local(&self, domain: &str) -> bool;

    /// Whether the domain is a vhost, a component domain or a name subdomain.
    fn is_local_or_component(&self, domain: &str) -> bool;

    /// Whether the vhost accepts anonymous logins. False for unknown domains.
    fn is_anonymous_enabled(&self, domain: &str) -> bool;
}

/// A pluggable subsystem that receives routed stanzas.
pub trait ServerComponent: Send + Sync {
    /// Unique component name, also the prefix of its name subdomains.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Called once the component is visible in the routing table.
    fn on_registered(&self, _resolver: Arc<dyn DomainResolver>) {}
}

impl fmt::Debug for dyn ServerComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerComponent")
            .field("name", &self.name())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_builders() {
        let caps = Capabilities::local().with_name_subdomains();
        assert!(caps.local_domains);
        assert!(caps.name_subdomains);
        assert!(!caps.non_local_domains);
        assert_eq!(Capabilities::default(), Capabilities::none());
    }
}
