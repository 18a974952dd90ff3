use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

/// Authenticated identity.
///
/// For queue endpoints the `owner_id` is the identity tickets are
/// keyed by (one live ticket per owner per scope). Admin lifecycle
/// endpoints additionally require `is_admin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub owner_id: String,
    pub method: String,
    pub is_admin: bool,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            owner_id: "anonymous".to_string(),
            method: "none".to_string(),
            is_admin: false,
        }
    }

    /// Identity for an unauthenticated visitor carrying a stable
    /// client-generated guest id.
    pub fn guest(guest_id: impl Into<String>) -> Self {
        Self {
            owner_id: guest_id.into(),
            method: "guest".to_string(),
            is_admin: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_identity() {
        let identity = Identity::anonymous();
        assert_eq!(identity.owner_id, "anonymous");
        assert_eq!(identity.method, "none");
        assert!(!identity.is_admin);
    }

    #[test]
    fn test_guest_identity() {
        let identity = Identity::guest("guest-abc123");
        assert_eq!(identity.owner_id, "guest-abc123");
        assert_eq!(identity.method, "guest");
        assert!(!identity.is_admin);
    }

    #[test]
    fn test_identity_serialization() {
        let identity = Identity {
            owner_id: "user123".to_string(),
            method: "api_key".to_string(),
            is_admin: true,
        };

        let json = serde_json::to_string(&identity).unwrap();
        let deserialized: Identity = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.owner_id, "user123");
        assert_eq!(deserialized.method, "api_key");
        assert!(deserialized.is_admin);
    }
}
