//! Explicit ownership checks for configuration commands.

use thiserror::Error;

/// The identity performing a command, passed explicitly by the caller.
#[derive(Debug, Clone)]
pub struct Requester {
    pub user_id: String,
    pub is_admin: bool,
}

impl Requester {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: true,
        }
    }
}

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("user {user_id} does not own this resource")]
    Denied { user_id: String },
}

/// Require that the requester is an admin or owns the resource.
///
/// Resources without an owner are admin-managed.
pub fn require_ownership(requester: &Requester, owner_id: Option<&str>) -> Result<(), AccessError> {
    if requester.is_admin {
        return Ok(());
    }
    match owner_id {
        Some(owner) if owner == requester.user_id => Ok(()),
        _ => Err(AccessError::Denied {
            user_id: requester.user_id.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_passes_everything() {
        let admin = Requester::admin("root");
        assert!(require_ownership(&admin, Some("someone")).is_ok());
        assert!(require_ownership(&admin, None).is_ok());
    }

    #[test]
    fn test_owner_passes_own_resource_only() {
        let user = Requester::user("u1");
        assert!(require_ownership(&user, Some("u1")).is_ok());
        assert!(require_ownership(&user, Some("u2")).is_err());
    }

    #[test]
    fn test_ownerless_resource_is_admin_managed() {
        let user = Requester::user("u1");
        assert!(require_ownership(&user, None).is_err());
    }
}
