use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Authenticator that accepts every request.
///
/// Visitors carrying an `X-Guest-Id` header become that guest; anyone
/// else is anonymous. Admin checks on lifecycle endpoints are skipped
/// entirely under this method; it exists for development and for
/// deployments that gate admin routes upstream.
pub struct NoneAuthenticator;

impl NoneAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoneAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let mut identity = match request.headers.get("x-guest-id") {
            Some(guest_id) if !guest_id.is_empty() => Identity::guest(guest_id),
            _ => Identity::anonymous(),
        };
        // With auth disabled the lifecycle endpoints are open.
        identity.is_admin = true;
        Ok(identity)
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}
