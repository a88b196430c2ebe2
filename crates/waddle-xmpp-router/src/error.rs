//! Error types for the routing and dispatch core.

use thiserror::Error;

/// Routing, dispatch and storage errors.
///
/// Per-stanza failures are turned into error stanzas by the
/// [`responder`](crate::responder); only the registration errors are meant
/// to escape to the host at startup.
#[derive(Debug, Error)]
pub enum XmppError {
    /// Destination is neither a vhost, a component domain nor a name subdomain
    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    /// Domain is local but nothing is registered to handle it
    #[error("No handler for: {0}")]
    NoHandler(String),

    /// Storage lookup for a user that does not exist
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// User already present in the repository
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Session exists but has not been authorized yet
    #[error("Session is not authorized")]
    NotAuthorized,

    /// The session has no live connection to address
    #[error("No connection id for session")]
    NoConnectionId,

    /// Lower level storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Processor id already taken in the registry
    #[error("Duplicate processor id: {0}")]
    DuplicateProcessorId(String),

    /// Component name already held by a different component
    #[error("Component name already registered: {0}")]
    DuplicateComponentName(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// XML parsing error
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// Malformed JID in an address attribute
    #[error("JID malformed: {0}")]
    JidMalformed(#[from] jid::Error),

    /// Stanza error raised by a processor
    #[error("Stanza error: {condition}")]
    Stanza {
        /// Error condition
        condition: StanzaErrorCondition,
        /// Error type
        error_type: StanzaErrorType,
        /// Optional text description
        text: Option<String>,
    },
}

impl XmppError {
    /// Create a new user-not-found error.
    pub fn user_not_found(user: impl ToString) -> Self {
        Self::UserNotFound(user.to_string())
    }

    /// Create a new storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a stanza error for 'bad-request'.
    pub fn bad_request(text: Option<String>) -> Self {
        Self::stanza(StanzaErrorCondition::BadRequest, text)
    }

    /// Create a stanza error for 'feature-not-implemented'.
    pub fn feature_not_implemented(text: Option<String>) -> Self {
        Self::stanza(StanzaErrorCondition::FeatureNotImplemented, text)
    }

    /// Create a stanza error with the condition's default type.
    pub fn stanza(condition: StanzaErrorCondition, text: Option<String>) -> Self {
        Self::Stanza {
            condition,
            error_type: condition.default_type(),
            text,
        }
    }

    /// Registration problems that abort startup in strict mode.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateProcessorId(_) | Self::DuplicateComponentName(_) | Self::Config(_)
        )
    }
}

/// XMPP stanza error conditions (RFC 6120 Section 8.3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StanzaErrorCondition {
    BadRequest,
    Conflict,
    FeatureNotImplemented,
    Forbidden,
    Gone,
    InternalServerError,
    ItemNotFound,
    JidMalformed,
    NotAcceptable,
    NotAllowed,
    NotAuthorized,
    PolicyViolation,
    RecipientUnavailable,
    Redirect,
    RegistrationRequired,
    RemoteServerNotFound,
    RemoteServerTimeout,
    ResourceConstraint,
    ServiceUnavailable,
    SubscriptionRequired,
    UndefinedCondition,
    UnexpectedRequest,
}

impl StanzaErrorCondition {
    /// Get the element name for this condition.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad-request",
            Self::Conflict => "conflict",
            Self::FeatureNotImplemented => "feature-not-implemented",
            Self::Forbidden => "forbidden",
            Self::Gone => "gone",
            Self::InternalServerError => "internal-server-error",
            Self::ItemNotFound => "item-not-found",
            Self::JidMalformed => "jid-malformed",
            Self::NotAcceptable => "not-acceptable",
            Self::NotAllowed => "not-allowed",
            Self::NotAuthorized => "not-authorized",
            Self::PolicyViolation => "policy-violation",
            Self::RecipientUnavailable => "recipient-unavailable",
            Self::Redirect => "redirect",
            Self::RegistrationRequired => "registration-required",
            Self::RemoteServerNotFound => "remote-server-not-found",
            Self::RemoteServerTimeout => "remote-server-timeout",
            Self::ResourceConstraint => "resource-constraint",
            Self::ServiceUnavailable => "service-unavailable",
            Self::SubscriptionRequired => "subscription-required",
            Self::UndefinedCondition => "undefined-condition",
            Self::UnexpectedRequest => "unexpected-request",
        }
    }

    /// Error type a server attaches to this condition unless told otherwise.
    pub fn default_type(&self) -> StanzaErrorType {
        match self {
            Self::BadRequest | Self::Gone | Self::JidMalformed | Self::NotAcceptable
            | Self::PolicyViolation | Self::Redirect => StanzaErrorType::Modify,
            Self::Forbidden | Self::NotAuthorized | Self::RegistrationRequired
            | Self::SubscriptionRequired => StanzaErrorType::Auth,
            Self::InternalServerError | Self::RecipientUnavailable
            | Self::RemoteServerTimeout | Self::ResourceConstraint
            | Self::UnexpectedRequest => StanzaErrorType::Wait,
            Self::Conflict | Self::FeatureNotImplemented | Self::ItemNotFound
            | Self::NotAllowed | Self::RemoteServerNotFound | Self::ServiceUnavailable
            | Self::UndefinedCondition => StanzaErrorType::Cancel,
        }
    }
}

impl std::fmt::Display for StanzaErrorCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// XMPP stanza error types (RFC 6120 Section 8.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StanzaErrorType {
    /// Retry after providing credentials
    Auth,
    /// Do not retry (unrecoverable error)
    Cancel,
    /// Proceed, the condition was only a warning
    Continue,
    /// Retry after changing the data sent
    Modify,
    /// Retry after waiting (temporary error)
    Wait,
}

impl StanzaErrorType {
    /// Get the type attribute value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Cancel => "cancel",
            Self::Continue => "continue",
            Self::Modify => "modify",
            Self::Wait => "wait",
        }
    }
}

impl std::fmt::Display for StanzaErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
