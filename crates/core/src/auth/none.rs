use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity, Role};

/// Authenticator that accepts all requests as anonymous with a fixed role.
/// Must be explicitly configured - the system won't default to this
pub struct NoneAuthenticator {
    role: Role,
}

impl NoneAuthenticator {
    pub fn new(role: Role) -> Self {
        Self { role }
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, _request: &AuthRequest) -> Result<Identity, AuthError> {
        Ok(Identity::anonymous(self.role))
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}
