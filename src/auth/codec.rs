/// Access Token Signing and Refresh Derivation
///
/// Access tokens are HS512 JWTs carrying [`AccessClaims`]. The algorithm and
/// issuer are pinned on verify; the header's `alg` is never trusted.
///
/// A refresh value is not random. It is the base64 text of the signature
/// segment of a second HS512 JWT whose only claim is the access token itself,
/// so it is bound to exactly one access token and to the server secret.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;

use crate::auth::claims::AccessClaims;
use crate::auth::hasher::constant_time_eq;
use crate::configuration::SecuritySettings;
use crate::error::{AppError, AuthError};

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS512;

/// Payload of the envelope whose signature becomes the refresh value
#[derive(Serialize)]
struct RefreshBinding<'a> {
    access: &'a str,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_token_expiry: i64,
    refresh_window: i64,
}

impl TokenCodec {
    pub fn new(
        secret: &str,
        issuer: impl Into<String>,
        access_token_expiry: i64,
        refresh_window: i64,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            access_token_expiry,
            refresh_window,
        }
    }

    pub fn from_settings(settings: &SecuritySettings) -> Self {
        Self::new(
            &settings.secret,
            settings.issuer.clone(),
            settings.access_token_expiry,
            settings.refresh_token_expiry,
        )
    }

    /// Sign a fresh access token for one session
    pub fn sign_access(
        &self,
        session_id: &str,
        guid: &str,
        client_origin: &str,
    ) -> Result<String, AppError> {
        let claims = AccessClaims::new(
            session_id,
            guid,
            client_origin,
            self.access_token_expiry,
            &self.issuer,
        );

        encode(&Header::new(SIGNING_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Derive the refresh value bound to `access_token`
    pub fn derive_refresh(&self, access_token: &str) -> Result<String, AppError> {
        let signature = self.binding_signature(access_token)?;
        Ok(STANDARD.encode(signature.as_bytes()))
    }

    /// Verify signature, algorithm, issuer, claim structure and expiry.
    ///
    /// # Errors
    /// - `InvalidSignature` for anything that fails signature verification
    /// - `MalformedToken` for a well-signed payload with bad claims
    /// - `TokenExpired` once `exp` has passed
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AppError> {
        let claims = self.verify_claims(token)?;

        if claims.is_expired() {
            tracing::debug!(session_id = %claims.sid, "Access token expired");
            return Err(AppError::Auth(AuthError::TokenExpired));
        }

        Ok(claims)
    }

    /// Like [`verify_access`](Self::verify_access), but an access token past
    /// its `exp` is accepted as long as it is still inside the refresh window.
    pub fn verify_for_rotation(&self, token: &str) -> Result<AccessClaims, AppError> {
        let claims = self.verify_claims(token)?;

        if !claims.is_refreshable(self.refresh_window) {
            tracing::debug!(session_id = %claims.sid, "Refresh window elapsed");
            return Err(AppError::Auth(AuthError::TokenExpired));
        }

        Ok(claims)
    }

    /// Recompute the refresh value for `access_token` and compare it with
    /// `candidate` in constant time. `candidate` is taken byte for byte.
    pub fn matches_refresh(&self, access_token: &str, candidate: &str) -> bool {
        let Ok(presented) = STANDARD.decode(candidate) else {
            return false;
        };
        let Ok(expected) = self.binding_signature(access_token) else {
            return false;
        };

        constant_time_eq(expected.as_bytes(), &presented)
    }

    fn verify_claims(&self, token: &str) -> Result<AccessClaims, AppError> {
        let payload = self.verified_payload(token)?;
        AccessClaims::from_payload(payload)
    }

    /// Signature check only; the payload stays untyped until it is trusted
    fn verified_payload(
        &self,
        token: &str,
    ) -> Result<serde_json::Map<String, serde_json::Value>, AppError> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        // Expiry is checked on the typed claims
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();

        decode::<serde_json::Map<String, serde_json::Value>>(
            token,
            &self.decoding_key,
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::warn!("Access token rejected: {}", e);
            AppError::Auth(AuthError::InvalidSignature)
        })
    }

    fn binding_signature(&self, access_token: &str) -> Result<String, AppError> {
        let envelope = encode(
            &Header::new(SIGNING_ALGORITHM),
            &RefreshBinding {
                access: access_token,
            },
            &self.encoding_key,
        )
        .map_err(|e| AppError::Internal(format!("Refresh derivation failed: {}", e)))?;

        match envelope.rsplit_once('.') {
            Some((_, signature)) => Ok(signature.to_string()),
            None => Err(AppError::Internal(
                "Refresh envelope has no signature segment".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test-secret-key-at-least-32-characters-long";

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, "test", 3600, 604800)
    }

    #[test]
    fn test_sign_and_verify_access() {
        let codec = codec();
        let token = codec
            .sign_access("sid-1", "guid-1", "10.0.0.1")
            .expect("Failed to sign token");
        let claims = codec.verify_access(&token).expect("Failed to verify token");

        assert_eq!(claims.sid, "sid-1");
        assert_eq!(claims.guid, "guid-1");
        assert_eq!(claims.origin, "10.0.0.1");
        assert_eq!(claims.iss, "test");
    }

    #[test]
    fn test_header_pins_hs512() {
        let token = codec().sign_access("sid-1", "guid-1", "10.0.0.1").unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::HS512);
    }

    #[test]
    fn test_garbage_token_is_signature_error() {
        let err = codec().verify_access("invalid.token.here").unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::InvalidSignature));
    }

    #[test]
    fn test_every_single_character_change_is_rejected() {
        let codec = codec();
        let token = codec.sign_access("sid-1", "guid-1", "10.0.0.1").unwrap();

        for (i, c) in token.char_indices() {
            let replacement = if c == 'A' { 'B' } else { 'A' };
            let mut tampered = token.clone();
            tampered.replace_range(i..i + 1, &replacement.to_string());

            let err = codec.verify_access(&tampered).unwrap_err();
            assert_eq!(
                err.auth_kind(),
                Some(AuthError::InvalidSignature),
                "tampering at position {} was not rejected",
                i
            );
        }
    }

    #[test]
    fn test_appended_character_is_rejected() {
        let codec = codec();
        let token = codec.sign_access("sid-1", "guid-1", "10.0.0.1").unwrap();

        let err = codec.verify_access(&format!("{}X", token)).unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::InvalidSignature));
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let token = codec().sign_access("sid-1", "guid-1", "10.0.0.1").unwrap();
        let other = TokenCodec::new("another-secret-key-at-least-32-characters", "test", 3600, 604800);

        let err = other.verify_access(&token).unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::InvalidSignature));
    }

    #[test]
    fn test_wrong_issuer_is_rejected() {
        let token = codec().sign_access("sid-1", "guid-1", "10.0.0.1").unwrap();
        let other = TokenCodec::new(SECRET, "wrong-issuer", 3600, 604800);

        assert!(other.verify_access(&token).is_err());
    }

    #[test]
    fn test_other_algorithm_with_same_secret_is_rejected() {
        let claims = AccessClaims::new("sid-1", "guid-1", "10.0.0.1", 3600, "test");
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let err = codec().verify_access(&token).unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::InvalidSignature));
    }

    #[test]
    fn test_well_signed_token_without_session_id_is_malformed() {
        let token = encode(
            &Header::new(Algorithm::HS512),
            &json!({ "guid": "guid-1", "origin": "10.0.0.1", "iat": 1, "exp": 9999999999i64, "iss": "test" }),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let err = codec().verify_access(&token).unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::MalformedToken));
    }

    #[test]
    fn test_expired_access_token() {
        let codec = TokenCodec::new(SECRET, "test", -120, 604800);
        let token = codec.sign_access("sid-1", "guid-1", "10.0.0.1").unwrap();

        let err = codec.verify_access(&token).unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::TokenExpired));

        // Still rotatable inside the refresh window
        assert!(codec.verify_for_rotation(&token).is_ok());
    }

    #[test]
    fn test_refresh_window_elapsed() {
        let codec = TokenCodec::new(SECRET, "test", -120, -60);
        let token = codec.sign_access("sid-1", "guid-1", "10.0.0.1").unwrap();

        let err = codec.verify_for_rotation(&token).unwrap_err();
        assert_eq!(err.auth_kind(), Some(AuthError::TokenExpired));
    }

    #[test]
    fn test_refresh_derivation_is_deterministic() {
        let codec = codec();
        let access = codec.sign_access("sid-1", "guid-1", "10.0.0.1").unwrap();

        let first = codec.derive_refresh(&access).unwrap();
        let second = codec.derive_refresh(&access).unwrap();

        assert!(!first.is_empty());
        assert_eq!(first, second);
        assert!(codec.matches_refresh(&access, &first));
    }

    #[test]
    fn test_refresh_is_bound_to_one_access_token() {
        let codec = codec();
        let a1 = codec.sign_access("sid-1", "guid-1", "10.0.0.1").unwrap();
        let a2 = codec.sign_access("sid-2", "guid-1", "10.0.0.1").unwrap();

        let r1 = codec.derive_refresh(&a1).unwrap();
        let r2 = codec.derive_refresh(&a2).unwrap();

        assert_ne!(r1, r2);
        assert!(!codec.matches_refresh(&a1, &r2));
        assert!(!codec.matches_refresh(&a2, &r1));
    }

    #[test]
    fn test_refresh_is_bound_to_secret() {
        let access = codec().sign_access("sid-1", "guid-1", "10.0.0.1").unwrap();
        let other = TokenCodec::new("another-secret-key-at-least-32-characters", "test", 3600, 604800);

        let forged = other.derive_refresh(&access).unwrap();
        assert!(!codec().matches_refresh(&access, &forged));
    }

    #[test]
    fn test_non_base64_refresh_does_not_match() {
        let codec = codec();
        let access = codec.sign_access("sid-1", "guid-1", "10.0.0.1").unwrap();

        assert!(!codec.matches_refresh(&access, "not-a-real-refresh"));
        assert!(!codec.matches_refresh(&access, ""));
    }

    #[test]
    fn test_padded_refresh_does_not_match() {
        let codec = codec();
        let access = codec.sign_access("sid-1", "guid-1", "10.0.0.1").unwrap();
        let refresh = codec.derive_refresh(&access).unwrap();

        assert!(!codec.matches_refresh(&access, &format!(" {} ", refresh)));
    }
}
