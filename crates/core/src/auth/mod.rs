mod caller;
mod none;
mod token;
mod traits;
mod types;

pub use caller::*;
pub use none::*;
pub use token::*;
pub use traits::*;
pub use types::*;

use crate::config::AuthConfig;

/// Factory function to create authenticator from config
pub fn create_authenticator(config: &AuthConfig) -> Result<Box<dyn Authenticator>, AuthError> {
    use crate::config::AuthMethod;

    match config.method {
        AuthMethod::None => Ok(Box::new(NoneAuthenticator::new(config.anonymous_role))),
        AuthMethod::Token => {
            if config.tokens.is_empty() {
                return Err(AuthError::ConfigurationError(
                    "at least one [[auth.tokens]] entry is required for token auth".to_string(),
                ));
            }
            Ok(Box::new(TokenAuthenticator::new(config.tokens.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMethod, TokenConfig};
    use std::collections::HashMap;

    #[test]
    fn test_create_authenticator_none() {
        let config = AuthConfig {
            method: AuthMethod::None,
            anonymous_role: Role::InternalOperator,
            tokens: vec![],
        };
        let auth = create_authenticator(&config).unwrap();
        assert_eq!(auth.method_name(), "none");
    }

    #[test]
    fn test_create_authenticator_token() {
        let config = AuthConfig {
            method: AuthMethod::Token,
            anonymous_role: Role::Admin,
            tokens: vec![TokenConfig {
                token: "secret".to_string(),
                username: "ana".to_string(),
                role: Role::Admin,
                permissions: HashMap::new(),
            }],
        };
        let auth = create_authenticator(&config).unwrap();
        assert_eq!(auth.method_name(), "token");
    }

    #[test]
    fn test_create_authenticator_token_without_tokens() {
        let config = AuthConfig {
            method: AuthMethod::Token,
            anonymous_role: Role::Admin,
            tokens: vec![],
        };
        let result = create_authenticator(&config);
        assert!(matches!(result, Err(AuthError::ConfigurationError(_))));
    }
}
