use serde::{Deserialize, Serialize};

/// Roles the external auth collaborator can resolve a caller into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Administrator,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Administrator => "administrator",
            Role::Owner => "owner",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "employee" => Some(Role::Employee),
            "administrator" => Some(Role::Administrator),
            "owner" => Some(Role::Owner),
            _ => None,
        }
    }

    /// Administrators and owners may bypass the shrinkage approval queue
    /// and perform manual stock reductions.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Administrator | Role::Owner)
    }
}

/// An already-authenticated caller. Credentials are checked by the auth
/// collaborator before anything reaches this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

/// Reserved actor id for engine-internal audit appends. `audit_log.actor_id`
/// is a weak reference, so no user row backs it.
pub const SYSTEM_ACTOR_ID: i64 = 0;

impl Actor {
    pub fn new(id: i64, role: Role) -> Self {
        Self { id, role }
    }

    /// Sentinel for audit entries produced by the engine itself rather than
    /// a human caller. Always passed explicitly, never assumed.
    pub fn system() -> Self {
        Self {
            id: SYSTEM_ACTOR_ID,
            role: Role::Owner,
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.role.is_privileged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_storage_strings() {
        for role in [Role::Employee, Role::Administrator, Role::Owner] {
            assert_eq!(Role::from_str(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_str("dueño"), None);
    }

    #[test]
    fn only_administrators_and_owners_are_privileged() {
        assert!(!Actor::new(1, Role::Employee).is_privileged());
        assert!(Actor::new(2, Role::Administrator).is_privileged());
        assert!(Actor::new(3, Role::Owner).is_privileged());
        assert!(Actor::system().is_privileged());
    }
}
