//! Caller identity as supplied by the external identity provider.

use serde::{Deserialize, Serialize};

use crate::{LedgerError, Result, UserId};

/// Marketplace role of a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Creator,
    Builder,
    Admin,
}

/// An authenticated user. The ledger trusts the identity provider for both
/// fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: UserId,
    /// `None` until the user finishes onboarding.
    pub role: Option<Role>,
}

impl AuthContext {
    #[must_use]
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            role: Some(role),
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}

/// Require a signed-in caller holding one of `roles`.
///
/// # Errors
/// - [`LedgerError::Unauthorized`] when there is no caller
/// - [`LedgerError::Forbidden`] when the caller's role is missing or not listed
pub fn require_role<'a>(actor: Option<&'a AuthContext>, roles: &[Role]) -> Result<&'a AuthContext> {
    let actor = actor.ok_or(LedgerError::Unauthorized)?;
    match actor.role {
        Some(role) if roles.contains(&role) => Ok(actor),
        _ => Err(LedgerError::Forbidden),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_actor_is_unauthorized() {
        let err = require_role(None, &[Role::Admin]).unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized));
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let ctx = AuthContext::new(UserId::new(), Role::Creator);
        let err = require_role(Some(&ctx), &[Role::Builder, Role::Admin]).unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden));
    }

    #[test]
    fn unassigned_role_is_forbidden() {
        let ctx = AuthContext {
            user_id: UserId::new(),
            role: None,
        };
        assert!(matches!(
            require_role(Some(&ctx), &[Role::Creator]),
            Err(LedgerError::Forbidden)
        ));
    }

    #[test]
    fn listed_role_passes() {
        let ctx = AuthContext::new(UserId::new(), Role::Builder);
        let ok = require_role(Some(&ctx), &[Role::Builder, Role::Admin]).unwrap();
        assert_eq!(ok.user_id, ctx.user_id);
    }
}
