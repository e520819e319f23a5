//! Ed25519-signed access and refresh tokens.
//!
//! Both token kinds carry the server-side session id (`sid`). The session,
//! not the token, holds the current company, so switching companies never
//! requires re-issuing tokens.

use base64::Engine;
use jwt_simple::prelude::*;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_ACCESS_EXPIRY: i64 = 3600;
const DEFAULT_REFRESH_EXPIRY: i64 = 7 * 24 * 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccessPayload {
    email: String,
    sid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RefreshPayload {
    /// Makes every refresh token unique, even within the same second.
    jti: String,
    sid: String,
}

/// Verified access token.
#[derive(Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub sid: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sid).ok()
    }
}

/// Verified refresh token.
#[derive(Debug, Clone)]
pub struct RefreshClaims {
    pub sub: String,
    pub token_id: String,
    pub sid: String,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("JWT_PRIVATE_KEY is not set")]
    Missing,
    #[error("JWT_PRIVATE_KEY is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("JWT_PRIVATE_KEY is not an Ed25519 key: {0}")]
    Key(jwt_simple::Error),
}

struct Verified<C> {
    subject: String,
    expires_at: i64,
    issued_at: i64,
    custom: C,
}

#[derive(Clone)]
pub struct JwtConfig {
    key_pair: Arc<Ed25519KeyPair>,
    public_key: Arc<Ed25519PublicKey>,
    pub access_token_expiry: i64,
    pub refresh_token_expiry: i64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl JwtConfig {
    pub fn from_key_pair(key_pair: Ed25519KeyPair) -> Self {
        let public_key = key_pair.public_key();
        Self {
            key_pair: Arc::new(key_pair),
            public_key: Arc::new(public_key),
            access_token_expiry: DEFAULT_ACCESS_EXPIRY,
            refresh_token_expiry: DEFAULT_REFRESH_EXPIRY,
            issuer: None,
            audience: None,
        }
    }

    /// Loads the signing key from a base64-encoded `JWT_PRIVATE_KEY` value.
    pub fn from_base64_key(encoded: &str) -> Result<Self, KeyError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
        let key_pair = Ed25519KeyPair::from_bytes(&bytes).map_err(KeyError::Key)?;
        Ok(Self::from_key_pair(key_pair))
    }

    pub fn from_env() -> Result<Self, KeyError> {
        let encoded = std::env::var("JWT_PRIVATE_KEY").map_err(|_| KeyError::Missing)?;
        Self::from_base64_key(&encoded)
    }

    pub fn with_expiry(mut self, access_secs: i64, refresh_secs: i64) -> Self {
        self.access_token_expiry = access_secs;
        self.refresh_token_expiry = refresh_secs;
        self
    }

    pub fn with_claims_scope(mut self, issuer: Option<String>, audience: Option<String>) -> Self {
        self.issuer = issuer;
        self.audience = audience;
        self
    }

    /// Fresh `(private, public)` key pair, base64-encoded.
    pub fn generate_key_pair() -> (String, String) {
        let engine = base64::engine::general_purpose::STANDARD;
        let key_pair = Ed25519KeyPair::generate();
        (
            engine.encode(key_pair.to_bytes()),
            engine.encode(key_pair.public_key().to_bytes()),
        )
    }

    fn sign<C: Serialize + DeserializeOwned>(
        &self,
        subject: Uuid,
        payload: C,
        lifetime_secs: i64,
    ) -> Result<String, jwt_simple::Error> {
        let lifetime = Duration::from_secs(lifetime_secs.max(1) as u64);
        let mut claims = jwt_simple::claims::Claims::with_custom_claims(payload, lifetime)
            .with_subject(subject.to_string());
        if let Some(issuer) = &self.issuer {
            claims = claims.with_issuer(issuer);
        }
        if let Some(audience) = &self.audience {
            claims = claims.with_audience(audience);
        }
        self.key_pair.sign(claims)
    }

    fn verify<C: Serialize + DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<Verified<C>, jwt_simple::Error> {
        let options = VerificationOptions {
            allowed_issuers: self.issuer.clone().map(|i| HashSet::from([i])),
            allowed_audiences: self.audience.clone().map(|a| HashSet::from([a])),
            ..Default::default()
        };
        let data = self.public_key.verify_token::<C>(token, Some(options))?;

        Ok(Verified {
            subject: data.subject.unwrap_or_default(),
            expires_at: data.expires_at.map(|t| t.as_secs() as i64).unwrap_or(0),
            issued_at: data.issued_at.map(|t| t.as_secs() as i64).unwrap_or(0),
            custom: data.custom,
        })
    }

    pub fn generate_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        session_id: Uuid,
    ) -> Result<String, jwt_simple::Error> {
        let payload = AccessPayload {
            email: email.to_string(),
            sid: session_id.to_string(),
        };
        self.sign(user_id, payload, self.access_token_expiry)
    }

    pub fn generate_refresh_token(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<String, jwt_simple::Error> {
        let payload = RefreshPayload {
            jti: Uuid::new_v4().to_string(),
            sid: session_id.to_string(),
        };
        self.sign(user_id, payload, self.refresh_token_expiry)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, jwt_simple::Error> {
        let verified = self.verify::<AccessPayload>(token)?;
        Ok(Claims {
            sub: verified.subject,
            email: verified.custom.email,
            sid: verified.custom.sid,
            exp: verified.expires_at,
            iat: verified.issued_at,
        })
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, jwt_simple::Error> {
        let verified = self.verify::<RefreshPayload>(token)?;
        Ok(RefreshClaims {
            sub: verified.subject,
            token_id: verified.custom.jti,
            sid: verified.custom.sid,
            exp: verified.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> JwtConfig {
        JwtConfig::from_key_pair(Ed25519KeyPair::generate())
    }

    #[test]
    fn test_access_token_carries_session_id() {
        let config = signer();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        let token = config
            .generate_access_token(user_id, "owner@acme.test", session_id)
            .unwrap();
        let claims = config.verify_access_token(&token).unwrap();

        assert_eq!(claims.user_id(), Some(user_id));
        assert_eq!(claims.session_id(), Some(session_id));
        assert_eq!(claims.email, "owner@acme.test");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_refresh_tokens_are_unique_per_issue() {
        let config = signer();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        let first = config.generate_refresh_token(user_id, session_id).unwrap();
        let second = config.generate_refresh_token(user_id, session_id).unwrap();
        assert_ne!(first, second);

        let claims = config.verify_refresh_token(&first).unwrap();
        assert_eq!(claims.sid, session_id.to_string());
    }

    #[test]
    fn test_access_token_is_not_a_refresh_token() {
        let config = signer();
        let access = config
            .generate_access_token(Uuid::new_v4(), "a@b.test", Uuid::new_v4())
            .unwrap();

        assert!(config.verify_refresh_token(&access).is_err());
    }

    #[test]
    fn test_foreign_key_and_garbage_are_rejected() {
        let token = signer()
            .generate_access_token(Uuid::new_v4(), "a@b.test", Uuid::new_v4())
            .unwrap();

        assert!(signer().verify_access_token(&token).is_err());
        assert!(signer().verify_access_token("not.a.jwt").is_err());
    }

    #[test]
    fn test_issuer_scope_is_enforced() {
        let key_pair = Ed25519KeyPair::generate();
        let issuing = JwtConfig::from_key_pair(key_pair.clone())
            .with_claims_scope(Some("estatehub".to_string()), None);
        let other = JwtConfig::from_key_pair(key_pair)
            .with_claims_scope(Some("billing".to_string()), None);

        let token = issuing
            .generate_access_token(Uuid::new_v4(), "a@b.test", Uuid::new_v4())
            .unwrap();

        assert!(issuing.verify_access_token(&token).is_ok());
        assert!(other.verify_access_token(&token).is_err());
    }

    #[test]
    fn test_base64_key_loading() {
        let (private_b64, _) = JwtConfig::generate_key_pair();
        assert!(JwtConfig::from_base64_key(&private_b64).is_ok());
        assert!(matches!(
            JwtConfig::from_base64_key("%%%"),
            Err(KeyError::Encoding(_))
        ));
    }
}
