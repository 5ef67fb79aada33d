//! Session derivation for schema requests.
//!
//! Every GraphQL request carries optional credentials (a session token and an
//! installation id). Before any resolver touches storage, the credentials are
//! turned into an [`AuthContext`] by an [`Authenticator`] and stored in a
//! [`SessionState`] shared across the request. Creating a principal object
//! replaces the request's context with one derived from the freshly minted
//! session token, so later operations in the same request act as the new
//! principal.

use async_trait::async_trait;
use derive_more::From;
use snafu::Snafu;
use std::sync::{Arc, PoisonError, RwLock};

/// The resolved identity of a request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthContext {
    /// The session token the context was derived from, if any.
    pub session_token: Option<String>,
    /// Opaque identifier of the installation making the request.
    pub installation_id: Option<String>,
}

impl AuthContext {
    /// A context with no credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Whether the context carries a session.
    pub fn is_authenticated(&self) -> bool {
        self.session_token.is_some()
    }
}

/// Raw credentials attached to a request.
#[derive(Clone, Debug, Default)]
pub struct SessionInput {
    pub session_token: Option<String>,
    pub installation_id: Option<String>,
}

impl SessionInput {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            session_token: Some(token.into()),
            ..Default::default()
        }
    }
}

/// Errors in session derivation.
#[derive(Clone, Debug, Snafu, PartialEq, Eq)]
pub enum AuthError {
    #[snafu(display("invalid session token"))]
    InvalidSession,
}

/// A pluggable strategy for turning credentials into an [`AuthContext`].
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn derive_context(&self, input: SessionInput) -> Result<AuthContext, AuthError>;
}

/// An authenticator that trusts any well-formed token.
///
/// Session tokens are opaque strings prefixed `r:`. Anything else is rejected,
/// absent credentials derive an anonymous context.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatelessAuthenticator;

#[async_trait]
impl Authenticator for StatelessAuthenticator {
    async fn derive_context(&self, input: SessionInput) -> Result<AuthContext, AuthError> {
        match &input.session_token {
            Some(token) if !token.starts_with("r:") => Err(AuthError::InvalidSession),
            _ => Ok(AuthContext {
                session_token: input.session_token,
                installation_id: input.installation_id,
            }),
        }
    }
}

/// The per-request authentication state, shared between resolvers.
#[derive(Clone, Debug, Default, From)]
pub struct SessionState(Arc<RwLock<AuthContext>>);

impl SessionState {
    pub fn new(context: AuthContext) -> Self {
        Self(Arc::new(RwLock::new(context)))
    }

    /// A snapshot of the current context.
    pub fn current(&self) -> AuthContext {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the context for the remainder of the request.
    pub fn replace(&self, context: AuthContext) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = context;
    }
}
