//! Signed companion tokens
//!
//! Tokens are HS256 JWTs signed with a shared secret, so any backend holding
//! the secret can check them with a standard JWT library.

use crate::code::UserId;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Token errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token is malformed")]
    Malformed,
    #[error("Token signature does not match")]
    BadSignature,
    #[error("Token has expired")]
    Expired,
    #[error("Token was issued for a different audience")]
    WrongAudience,
    #[error("Token was issued by a different issuer")]
    WrongIssuer,
    #[error("Invalid signing key")]
    InvalidKey,
    #[error("Token issuance failed: {0}")]
    Issuance(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidAudience => TokenError::WrongAudience,
            ErrorKind::InvalidIssuer => TokenError::WrongIssuer,
            _ => TokenError::Malformed,
        }
    }
}

pub type TokenResult<T> = Result<T, TokenError>;

/// A freshly issued token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Produces credentials a companion device presents to the backend
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self, user_id: &UserId) -> TokenResult<IssuedToken>;
}

/// Claims carried by a companion token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl TokenClaims {
    pub fn user_id(&self) -> UserId {
        UserId::new(self.sub.clone())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

/// HS256 token issuer and validator
pub struct SignedTokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl std::fmt::Debug for SignedTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTokenIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SignedTokenIssuer {
    /// Create an issuer; rejects an empty key
    pub fn new(
        key: impl Into<Vec<u8>>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        ttl: std::time::Duration,
    ) -> TokenResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(TokenError::InvalidKey);
        }
        let ttl = Duration::from_std(ttl)
            .map_err(|_| TokenError::Issuance("token lifetime out of range".to_string()))?;
        let issuer = issuer.into();
        let audience = audience.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(&[&audience]);
        validation.set_issuer(&[&issuer]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(&key),
            decoding: DecodingKey::from_secret(&key),
            validation,
            issuer,
            audience,
            ttl,
        })
    }

    /// Sign a token for `user_id` as of `now`
    pub fn sign(&self, user_id: &UserId, now: DateTime<Utc>) -> TokenResult<IssuedToken> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| TokenError::Issuance("token lifetime out of range".to_string()))?;
        let claims = TokenClaims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Issuance(e.to_string()))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Validate a token against the current time and return its claims
    pub fn validate(&self, token: &str) -> TokenResult<TokenClaims> {
        let data = decode::<TokenClaims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }
}

#[async_trait]
impl TokenIssuer for SignedTokenIssuer {
    async fn issue(&self, user_id: &UserId) -> TokenResult<IssuedToken> {
        self.sign(user_id, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn issuer_with(key: &[u8], issuer: &str, audience: &str, ttl_secs: u64) -> SignedTokenIssuer {
        SignedTokenIssuer::new(
            key.to_vec(),
            issuer,
            audience,
            std::time::Duration::from_secs(ttl_secs),
        )
        .unwrap()
    }

    fn issuer() -> SignedTokenIssuer {
        issuer_with(SECRET, "pairlink", "pairlink-companion", 3600)
    }

    #[test]
    fn test_sign_and_validate() {
        let issuer = issuer();
        let now = Utc::now();
        let issued = issuer.sign(&UserId::new("u1"), now).unwrap();
        assert_eq!(issued.token.split('.').count(), 3);
        assert_eq!(issued.expires_at, now + Duration::seconds(3600));

        let claims = issuer.validate(&issued.token).unwrap();
        assert_eq!(claims.user_id(), UserId::new("u1"));
        assert_eq!(claims.iss, "pairlink");
        assert_eq!(claims.aud, "pairlink-companion");
        assert_eq!(claims.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn test_tokens_are_unique() {
        let issuer = issuer();
        let now = Utc::now();
        let a = issuer.sign(&UserId::new("u1"), now).unwrap();
        let b = issuer.sign(&UserId::new("u1"), now).unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_rejects_spliced_claims() {
        let issuer = issuer();
        let now = Utc::now();
        let mine = issuer.sign(&UserId::new("u1"), now).unwrap();
        let theirs = issuer.sign(&UserId::new("admin"), now).unwrap();

        // admin's claims under u1's signature
        let mine: Vec<&str> = mine.token.split('.').collect();
        let theirs: Vec<&str> = theirs.token.split('.').collect();
        let forged = format!("{}.{}.{}", mine[0], theirs[1], mine[2]);

        assert!(matches!(
            issuer.validate(&forged),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn test_rejects_other_key() {
        let other = issuer_with(
            b"ffffffffffffffffffffffffffffffff",
            "pairlink",
            "pairlink-companion",
            3600,
        );
        let issued = other.sign(&UserId::new("u1"), Utc::now()).unwrap();
        assert!(matches!(
            issuer().validate(&issued.token),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn test_rejects_expired() {
        let issuer = issuer();
        let issued_at = Utc::now() - Duration::hours(2);
        let issued = issuer.sign(&UserId::new("u1"), issued_at).unwrap();
        assert!(matches!(
            issuer.validate(&issued.token),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_rejects_wrong_audience() {
        let other = issuer_with(SECRET, "pairlink", "somebody-else", 3600);
        let issued = other.sign(&UserId::new("u1"), Utc::now()).unwrap();
        assert!(matches!(
            issuer().validate(&issued.token),
            Err(TokenError::WrongAudience)
        ));
    }

    #[test]
    fn test_rejects_wrong_issuer() {
        let other = issuer_with(SECRET, "elsewhere", "pairlink-companion", 3600);
        let issued = other.sign(&UserId::new("u1"), Utc::now()).unwrap();
        assert!(matches!(
            issuer().validate(&issued.token),
            Err(TokenError::WrongIssuer)
        ));
    }

    #[test]
    fn test_rejects_malformed() {
        let issuer = issuer();
        for token in ["", "abc", "a.b", "a.b.c.d", "a.b.!!!"] {
            assert!(issuer.validate(token).is_err(), "{:?}", token);
        }
    }

    #[test]
    fn test_rejects_empty_key() {
        assert!(matches!(
            SignedTokenIssuer::new(
                Vec::new(),
                "pairlink",
                "pairlink-companion",
                std::time::Duration::from_secs(60)
            ),
            Err(TokenError::InvalidKey)
        ));
    }

    #[test]
    fn test_huge_lifetime_fails_instead_of_overflowing() {
        let issuer = issuer_with(SECRET, "pairlink", "pairlink-companion", 100_000_000_000_000);
        assert!(matches!(
            issuer.sign(&UserId::new("u1"), Utc::now()),
            Err(TokenError::Issuance(_))
        ));
    }
}
