//! Authorization view of an identity.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};

use super::{Identity, Role};

/// Features gated per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Toggle machine activation.
    ManageFleet,
    /// Add entries to a machine queue.
    Enqueue,
    /// Start and finish queue entries.
    OperateQueue,
    Maintenance,
    ProductionOrders,
    WindingTickets,
    Reports,
}

impl Permission {
    pub const ALL: [Permission; 7] = [
        Permission::ManageFleet,
        Permission::Enqueue,
        Permission::OperateQueue,
        Permission::Maintenance,
        Permission::ProductionOrders,
        Permission::WindingTickets,
        Permission::Reports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageFleet => "manage_fleet",
            Permission::Enqueue => "enqueue",
            Permission::OperateQueue => "operate_queue",
            Permission::Maintenance => "maintenance",
            Permission::ProductionOrders => "production_orders",
            Permission::WindingTickets => "winding_tickets",
            Permission::Reports => "reports",
        }
    }

    /// What a role may do when no explicit override is configured.
    pub fn granted_by_default(&self, role: Role) -> bool {
        match (self, role) {
            (_, Role::Admin) => true,
            (Permission::Maintenance, _) => true,
            (
                Permission::Enqueue | Permission::ProductionOrders | Permission::WindingTickets,
                Role::InternalOperator,
            ) => true,
            (Permission::OperateQueue, Role::ExternalOperator) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown permission: {}", s))
    }
}

/// The caller of a core operation: who they are and what they may do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub username: String,
    pub role: Role,
    overrides: HashMap<Permission, bool>,
}

impl Caller {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
            overrides: HashMap::new(),
        }
    }

    pub fn admin(username: impl Into<String>) -> Self {
        Self::new(username, Role::Admin)
    }

    pub fn with_permission(mut self, permission: Permission, granted: bool) -> Self {
        self.overrides.insert(permission, granted);
        self
    }

    /// Admins are never restricted; otherwise an explicit override wins over
    /// the role default.
    pub fn can(&self, permission: Permission) -> bool {
        if self.role == Role::Admin {
            return true;
        }
        self.overrides
            .get(&permission)
            .copied()
            .unwrap_or_else(|| permission.granted_by_default(self.role))
    }

    pub fn require(&self, permission: Permission) -> DispatchResult<()> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(DispatchError::PermissionDenied(format!(
                "{} ({}) lacks the {} permission",
                self.username, self.role, permission
            )))
        }
    }
}

impl From<&Identity> for Caller {
    /// Unknown permission names are ignored; config validation rejects them
    /// for token identities.
    fn from(identity: &Identity) -> Self {
        let overrides = identity
            .permissions
            .iter()
            .filter_map(|(name, granted)| name.parse::<Permission>().ok().map(|p| (p, *granted)))
            .collect();
        Self {
            username: identity.username.clone(),
            role: identity.role,
            overrides,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_defaults() {
        let internal = Caller::new("ines", Role::InternalOperator);
        let external = Caller::new("edu", Role::ExternalOperator);

        assert!(internal.can(Permission::Enqueue));
        assert!(internal.can(Permission::ProductionOrders));
        assert!(!internal.can(Permission::OperateQueue));
        assert!(!internal.can(Permission::ManageFleet));

        assert!(external.can(Permission::OperateQueue));
        assert!(!external.can(Permission::Enqueue));
        assert!(!external.can(Permission::WindingTickets));

        for caller in [&internal, &external] {
            assert!(caller.can(Permission::Maintenance));
            assert!(!caller.can(Permission::Reports));
        }
    }

    #[test]
    fn test_admin_can_everything_even_when_overridden() {
        let admin = Caller::admin("root").with_permission(Permission::Reports, false);
        for permission in Permission::ALL {
            assert!(admin.can(permission));
        }
    }

    #[test]
    fn test_override_beats_role_default() {
        let caller = Caller::new("edu", Role::ExternalOperator)
            .with_permission(Permission::Reports, true)
            .with_permission(Permission::Maintenance, false);
        assert!(caller.can(Permission::Reports));
        assert!(!caller.can(Permission::Maintenance));
    }

    #[test]
    fn test_require_returns_permission_denied() {
        let caller = Caller::new("ines", Role::InternalOperator);
        let err = caller.require(Permission::ManageFleet).unwrap_err();
        assert!(matches!(err, DispatchError::PermissionDenied(_)));
        assert!(err.to_string().contains("manage_fleet"));
    }

    #[test]
    fn test_from_identity_skips_unknown_names() {
        let identity = Identity {
            username: "edu".into(),
            role: Role::ExternalOperator,
            method: "token".into(),
            permissions: HashMap::from([
                ("enqueue".to_string(), true),
                ("fly".to_string(), true),
            ]),
        };
        let caller = Caller::from(&identity);
        assert!(caller.can(Permission::Enqueue));
        assert_eq!(caller.overrides.len(), 1);
    }
}
