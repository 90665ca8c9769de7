//! Bearer token authentication against the configured operator tokens.

use async_trait::async_trait;

use crate::config::TokenConfig;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Authenticator that maps each configured token to an operator identity.
///
/// Accepts the token in either:
/// - `Authorization: Bearer <token>` header
/// - `X-API-Key: <token>` header
pub struct TokenAuthenticator {
    tokens: Vec<TokenConfig>,
}

impl TokenAuthenticator {
    pub fn new(tokens: Vec<TokenConfig>) -> Self {
        Self { tokens }
    }

    fn extract_token<'a>(&self, request: &'a AuthRequest) -> Option<&'a str> {
        if let Some(auth_header) = request.headers.get("authorization") {
            if let Some(token) = auth_header
                .strip_prefix("Bearer ")
                .or_else(|| auth_header.strip_prefix("bearer "))
            {
                return Some(token.trim());
            }
        }

        request.headers.get("x-api-key").map(|k| k.trim())
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let provided = self
            .extract_token(request)
            .ok_or(AuthError::NotAuthenticated)?;

        // Compare against every entry so timing does not reveal the position.
        let mut matched: Option<&TokenConfig> = None;
        for entry in &self.tokens {
            if constant_time_eq(provided.as_bytes(), entry.token.as_bytes()) && matched.is_none() {
                matched = Some(entry);
            }
        }

        match matched {
            Some(entry) => Ok(Identity {
                username: entry.username.clone(),
                role: entry.role,
                method: "token".to_string(),
                permissions: entry.permissions.clone(),
            }),
            None => Err(AuthError::InvalidCredentials("Unknown token".to_string())),
        }
    }

    fn method_name(&self) -> &'static str {
        "token"
    }
}

/// Constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
