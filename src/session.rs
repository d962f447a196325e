//! Caller identity: a registered user or an anonymous session.
//!
//! Every entity that belongs to someone (panic events, reports, bookings,
//! contacts) references exactly one of a user id or an anonymous session id.
//! The invariant is enforced by construction: [`CallerIdentity`] can only be
//! built through its two constructors or by deserializing a body that sets
//! exactly one field.

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Exactly one of `user_id` / `anonymous_session_id` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous_session_id: Option<String>,
}

#[derive(Debug)]
pub enum IdentityError {
    /// Neither or both of user id and session id were provided.
    Ambiguous,
    EmptyId,
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityError::Ambiguous => {
                write!(f, "exactly one of user_id and anonymous_session_id required")
            }
            IdentityError::EmptyId => write!(f, "identity id cannot be empty"),
        }
    }
}

impl std::error::Error for IdentityError {}

impl CallerIdentity {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            anonymous_session_id: None,
        }
    }

    pub fn anonymous(session_id: impl Into<String>) -> Self {
        Self {
            user_id: None,
            anonymous_session_id: Some(session_id.into()),
        }
    }

    /// Generate a fresh anonymous session identity (16 random bytes, hex).
    pub fn new_anonymous() -> Self {
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self::anonymous(hex::encode(bytes))
    }

    /// Validate the exactly-one invariant on a deserialized identity.
    pub fn validate(&self) -> Result<(), IdentityError> {
        match (&self.user_id, &self.anonymous_session_id) {
            (Some(u), None) if !u.is_empty() => Ok(()),
            (None, Some(s)) if !s.is_empty() => Ok(()),
            (Some(_), None) | (None, Some(_)) => Err(IdentityError::EmptyId),
            _ => Err(IdentityError::Ambiguous),
        }
    }

    /// The single id value, whichever side it lives on.  Empty only when
    /// the invariant is violated, which `validate` prevents for any
    /// identity accepted from the outside.
    pub fn key(&self) -> &str {
        self.user_id
            .as_deref()
            .or(self.anonymous_session_id.as_deref())
            .unwrap_or("")
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous_session_id.is_some()
    }
}
