use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::auth::Role;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub numbering: NumberingConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub fleet: FleetConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Role given to every request when `method = "none"`.
    #[serde(default = "default_anonymous_role")]
    pub anonymous_role: Role,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

fn default_anonymous_role() -> Role {
    Role::Admin
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    Token,
}

/// One operator token and the identity it resolves to
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenConfig {
    pub token: String,
    pub username: String,
    pub role: Role,
    /// Overrides of the role defaults, e.g. `{ reports = true }`.
    #[serde(default)]
    pub permissions: HashMap<String, bool>,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("spindle.db")
}

/// Document numbering
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NumberingConfig {
    /// The series starts right after this value (1000 -> first number 1001).
    /// Only used when the counter does not exist yet.
    #[serde(default = "default_start_after")]
    pub start_after: u64,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            start_after: default_start_after(),
        }
    }
}

fn default_start_after() -> u64 {
    1000
}

/// Dispatch behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// When a finalized ticket fans out onto an idle machine, start that
    /// machine's new entry right away instead of leaving it pending.
    #[serde(default = "default_auto_start_idle")]
    pub auto_start_idle: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            auto_start_idle: default_auto_start_idle(),
        }
    }
}

fn default_auto_start_idle() -> bool {
    true
}

/// Fleet layout overrides. A missing list keeps the built-in layout.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub layout_a: Option<Vec<String>>,
    #[serde(default)]
    pub layout_b: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub numbering: NumberingConfig,
    pub dispatch: DispatchConfig,
    pub fleet: SanitizedFleetConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: AuthMethod,
    pub anonymous_role: Role,
    /// Usernames and roles only; tokens never leave the process.
    pub operators: Vec<SanitizedOperator>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedOperator {
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedFleetConfig {
    pub layout_a_overridden: bool,
    pub layout_b_overridden: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: config.auth.method,
                anonymous_role: config.auth.anonymous_role,
                operators: config
                    .auth
                    .tokens
                    .iter()
                    .map(|t| SanitizedOperator {
                        username: t.username.clone(),
                        role: t.role,
                    })
                    .collect(),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            numbering: config.numbering.clone(),
            dispatch: config.dispatch.clone(),
            fleet: SanitizedFleetConfig {
                layout_a_overridden: config.fleet.layout_a.is_some(),
                layout_b_overridden: config.fleet.layout_b.is_some(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let toml = r#"
[auth]
method = "none"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.method, AuthMethod::None);
        assert_eq!(config.auth.anonymous_role, Role::Admin);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.numbering.start_after, 1000);
        assert!(config.dispatch.auto_start_idle);
        assert!(config.fleet.layout_a.is_none());
        assert!(!config.logging.json);
    }

    #[test]
    fn test_deserialize_tokens_and_overrides() {
        let toml = r#"
[auth]
method = "token"

[[auth.tokens]]
token = "t-ana"
username = "ana"
role = "admin"

[[auth.tokens]]
token = "t-edu"
username = "edu"
role = "operador_externo"
permissions = { reports = true }

[numbering]
start_after = 5000

[dispatch]
auto_start_idle = false

[fleet]
layout_a = ["CD1", "CD2"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.method, AuthMethod::Token);
        assert_eq!(config.auth.tokens.len(), 2);
        assert_eq!(config.auth.tokens[1].role, Role::ExternalOperator);
        assert_eq!(config.auth.tokens[1].permissions.get("reports"), Some(&true));
        assert_eq!(config.numbering.start_after, 5000);
        assert!(!config.dispatch.auto_start_idle);
        assert_eq!(config.fleet.layout_a.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_deserialize_missing_auth_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_sanitized_config_hides_tokens() {
        let toml = r#"
[auth]
method = "token"

[[auth.tokens]]
token = "super-secret"
username = "ana"
role = "admin"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(json.contains("\"ana\""));
    }
}
