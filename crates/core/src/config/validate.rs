use std::collections::HashSet;

use crate::auth::Permission;
use crate::fleet::FleetCatalog;

use super::{types::Config, AuthMethod, ConfigError};

/// Validate configuration
/// - server port is not 0
/// - token auth has at least one token, tokens are unique and non-empty,
///   permission names are known
/// - the fleet catalog has no blank or duplicated machine codes
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.auth.method == AuthMethod::Token && config.auth.tokens.is_empty() {
        return Err(ConfigError::ValidationError(
            "auth.method = \"token\" requires at least one [[auth.tokens]] entry".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for entry in &config.auth.tokens {
        if entry.token.trim().is_empty() || entry.username.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.tokens entries need a token and a username".to_string(),
            ));
        }
        if !seen.insert(entry.token.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate token configured for {}",
                entry.username
            )));
        }
        for name in entry.permissions.keys() {
            if name.parse::<Permission>().is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "unknown permission {:?} for {}",
                    name, entry.username
                )));
            }
        }
    }

    FleetCatalog::from_config(&config.fleet)
        .validate()
        .map_err(|e| ConfigError::ValidationError(format!("fleet: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn parse(toml: &str) -> Config {
        load_config_from_str(toml).unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&parse("[auth]\nmethod = \"none\"\n")).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = parse("[auth]\nmethod = \"none\"\n[server]\nport = 0\n");
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_token_method_needs_tokens() {
        let config = parse("[auth]\nmethod = \"token\"\n");
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_tokens() {
        let config = parse(
            r#"
[auth]
method = "token"

[[auth.tokens]]
token = "same"
username = "ana"
role = "admin"

[[auth.tokens]]
token = "same"
username = "edu"
role = "external_operator"
"#,
        );
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate token"));
    }

    #[test]
    fn test_validate_unknown_permission() {
        let config = parse(
            r#"
[auth]
method = "token"

[[auth.tokens]]
token = "t"
username = "ana"
role = "internal_operator"
permissions = { teleport = true }
"#,
        );
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("teleport"));
    }

    #[test]
    fn test_validate_fleet_duplicates() {
        let config = parse(
            r#"
[auth]
method = "none"

[fleet]
layout_a = ["CD1", "CD1"]
"#,
        );
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("fleet"));
    }
}
