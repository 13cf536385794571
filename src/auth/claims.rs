/// Access Token Claims
///
/// The signed payload of an access token. Parsed into this typed struct only
/// after the signature has been verified, so a missing or mistyped field is
/// a reportable error instead of a panic.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AuthError};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AccessClaims {
    /// Session identifier, the unit of revocation
    pub sid: String,
    /// Owning user's guid
    pub guid: String,
    /// Client network origin at issuance
    pub origin: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

impl AccessClaims {
    pub fn new(
        session_id: &str,
        guid: &str,
        origin: &str,
        expiry_seconds: i64,
        issuer: &str,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sid: session_id.to_string(),
            guid: guid.to_string(),
            origin: origin.to_string(),
            iat: now,
            exp: now + expiry_seconds,
            iss: issuer.to_string(),
        }
    }

    /// Checked conversion from a verified but untyped payload
    pub fn from_payload(payload: serde_json::Map<String, serde_json::Value>) -> Result<Self, AppError> {
        let claims: AccessClaims = serde_json::from_value(serde_json::Value::Object(payload))
            .map_err(|e| {
                tracing::warn!(error = %e, "Signed token carries malformed claims");
                AppError::Auth(AuthError::MalformedToken)
            })?;

        if claims.sid.trim().is_empty() || claims.guid.trim().is_empty() {
            tracing::warn!("Signed token carries an empty session id or guid");
            return Err(AppError::Auth(AuthError::MalformedToken));
        }

        Ok(claims)
    }

    pub fn session_id(&self) -> &str {
        &self.sid
    }

    pub fn is_expired(&self) -> bool {
        self.exp < chrono::Utc::now().timestamp()
    }

    /// Whether the token is still inside the window in which it may be rotated
    pub fn is_refreshable(&self, refresh_window_seconds: i64) -> bool {
        chrono::Utc::now().timestamp() <= self.iat + refresh_window_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_claims_creation() {
        let claims = AccessClaims::new("sid-1", "guid-1", "10.0.0.1", 3600, "test");

        assert_eq!(claims.session_id(), "sid-1");
        assert_eq!(claims.guid, "guid-1");
        assert_eq!(claims.origin, "10.0.0.1");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert!(!claims.is_expired());
        assert!(claims.is_refreshable(3600));
    }

    #[test]
    fn test_expired_claims() {
        let claims = AccessClaims::new("sid-1", "guid-1", "10.0.0.1", -10, "test");
        assert!(claims.is_expired());
    }

    #[test]
    fn test_refresh_window_elapsed() {
        let mut claims = AccessClaims::new("sid-1", "guid-1", "10.0.0.1", 60, "test");
        claims.iat -= 7200;
        assert!(!claims.is_refreshable(3600));
    }

    #[test]
    fn test_from_payload_round_trips_struct() {
        let claims = AccessClaims::new("sid-1", "guid-1", "10.0.0.1", 60, "test");
        let value = serde_json::to_value(&claims).unwrap();

        assert_eq!(AccessClaims::from_payload(payload(value)).unwrap(), claims);
    }

    #[test]
    fn test_missing_session_id_is_malformed() {
        let result = AccessClaims::from_payload(payload(json!({
            "guid": "guid-1", "origin": "10.0.0.1", "iat": 1, "exp": 2, "iss": "test"
        })));

        assert_eq!(result.unwrap_err().auth_kind(), Some(AuthError::MalformedToken));
    }

    #[test]
    fn test_mistyped_claim_is_malformed() {
        let result = AccessClaims::from_payload(payload(json!({
            "sid": 42, "guid": "guid-1", "origin": "10.0.0.1", "iat": 1, "exp": 2, "iss": "test"
        })));

        assert_eq!(result.unwrap_err().auth_kind(), Some(AuthError::MalformedToken));
    }

    #[test]
    fn test_empty_session_id_is_malformed() {
        let result = AccessClaims::from_payload(payload(json!({
            "sid": "", "guid": "guid-1", "origin": "10.0.0.1", "iat": 1, "exp": 2, "iss": "test"
        })));

        assert_eq!(result.unwrap_err().auth_kind(), Some(AuthError::MalformedToken));
    }
}
