//! Core types shared by the Kitbase sync and chat crates.
//!
//! Both subsystems gate their remote behavior on the presence of an
//! authenticated [`Identity`], obtained through an [`IdentityProvider`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An authenticated end user as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque user id (a UUID string for Supabase-issued identities).
    pub id: String,
    pub email: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.id, self.email)
    }
}

/// Source of the currently signed-in user.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the current user, or `None` when nobody is signed in or the
    /// session could not be resolved.
    async fn current_user(&self) -> Option<Identity>;
}

/// Identity provider returning a fixed identity (or none).
///
/// Used by CLIs and tests where the identity is known up front.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<Identity>);

impl StaticIdentity {
    pub fn signed_in(identity: Identity) -> Self {
        Self(Some(identity))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Option<Identity> {
        self.0.clone()
    }
}
