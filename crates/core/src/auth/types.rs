use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

/// Operator role on the production floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[serde(alias = "operador_interno")]
    InternalOperator,
    #[serde(alias = "operador_externo")]
    ExternalOperator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::InternalOperator => "internal_operator",
            Role::ExternalOperator => "external_operator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "internal_operator" | "operador_interno" => Ok(Role::InternalOperator),
            "external_operator" | "operador_externo" => Ok(Role::ExternalOperator),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Authenticated identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub role: Role,
    pub method: String,
    /// Per-feature overrides of the role defaults, keyed by permission name.
    #[serde(default)]
    pub permissions: HashMap<String, bool>,
}

impl Identity {
    pub fn anonymous(role: Role) -> Self {
        Self {
            username: "anonymous".to_string(),
            role,
            method: "none".to_string(),
            permissions: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_identity() {
        let identity = Identity::anonymous(Role::InternalOperator);
        assert_eq!(identity.username, "anonymous");
        assert_eq!(identity.method, "none");
        assert_eq!(identity.role, Role::InternalOperator);
        assert!(identity.permissions.is_empty());
    }

    #[test]
    fn test_role_accepts_plant_floor_aliases() {
        let role: Role = serde_json::from_str("\"operador_externo\"").unwrap();
        assert_eq!(role, Role::ExternalOperator);
        assert_eq!("operador_interno".parse::<Role>().unwrap(), Role::InternalOperator);
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert!("supervisor".parse::<Role>().is_err());
    }

    #[test]
    fn test_identity_serialization() {
        let identity = Identity {
            username: "carla".to_string(),
            role: Role::ExternalOperator,
            method: "token".to_string(),
            permissions: HashMap::from([("maintenance".to_string(), false)]),
        };

        let json = serde_json::to_string(&identity).unwrap();
        let deserialized: Identity = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.username, "carla");
        assert_eq!(deserialized.role, Role::ExternalOperator);
        assert_eq!(deserialized.permissions.get("maintenance"), Some(&false));
    }
}
