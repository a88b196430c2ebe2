//! # waddle-xmpp-router
//!
//! Virtual host routing and stanza dispatch core for the Waddle XMPP server.
//!
//! For every inbound stanza this crate decides which virtual host owns it,
//! which server components receive a copy, and which processor plugins run
//! on it along one of five processing paths.
//!
//! ## Architecture
//!
//! - **VHost registry**: lookup contract over configured virtual hosts
//! - **Component router**: lock-free routing table of local, non-local and
//!   name-subdomain components
//! - **Processor registry**: processors matched by element path and namespace
//! - **Dispatch engine**: picks the processing path from session state and
//!   destination, isolates processor failures
//! - **Error responder**: maps failures to stanza errors
//!
//! ## Built-in processors
//!
//! - RFC 3921 session establishment
//! - XEP-0054 (vcard-temp)
//!
//! ## Example
//!
//! ```ignore
//! use waddle_xmpp_router::{RouterSettings, RoutingCore};
//!
//! let core = RoutingCore::from_settings(RouterSettings::load(None)?)?;
//! let session = core.new_session(Some(connection_id), "example.com");
//! let report = core.engine().dispatch(&packet, Some(session)).await;
//! for stanza in report.results {
//!     // hand to the connection manager
//! }
//! ```

pub mod bootstrap;
pub mod config;
pub mod dispatch;
pub mod metrics;
pub mod ns;
pub mod packet;
pub mod processor;
pub mod processors;
pub mod repository;
pub mod responder;
pub mod router;
pub mod session;
pub mod stats;
pub mod vhost;

mod error;
mod types;

pub use bootstrap::RoutingCore;
pub use config::{RouterSettings, VHostRepositoryKind, VHostSettings};
pub use dispatch::{DispatchEngine, DispatchOutcome, DispatchReport, EngineConfig, ProcessingPath};
pub use error::{StanzaErrorCondition, StanzaErrorType, XmppError};
pub use packet::Packet;
pub use processor::{ElementPath, ProcessorRegistry, XmppProcessor};
pub use repository::{MemoryUserRepository, UserRepository};
pub use router::{
    Capabilities, ComponentRouter, DomainResolver, LocalResolution, RouterHandle, ServerComponent,
};
pub use session::Session;
pub use stats::{RouterStatistics, StatRecord};
pub use types::*;
pub use vhost::{MemoryVHostRepository, VHostItem, VHostRepository};
