use chrono::Duration;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use service_core::utils::SharedClock;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Role;

/// Discriminator carried by every refresh token.
pub const REFRESH_TOKEN_KIND: &str = "refresh";

/// Why a token was rejected. Only logged; callers collapse every variant
/// into one unauthorized outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("wrong token kind")]
    WrongKind,
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub jti: String,
}

/// Claims for refresh tokens (long-lived)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: Uuid,
    #[serde(default)]
    pub token_kind: String,
    pub iat: i64,
    pub exp: i64,
    /// Keeps two refresh tokens minted in the same second distinct.
    pub jti: String,
}

/// Identity a token pair is minted for.
#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Mints and verifies HS256 access and refresh tokens. Each kind has its own
/// secret so that one can never be forged from the other.
#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: SharedClock,
}

impl TokenService {
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
        clock: SharedClock,
    ) -> Result<Self, anyhow::Error> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            anyhow::bail!("JWT secrets must not be empty");
        }
        if access_secret == refresh_secret {
            anyhow::bail!("Access and refresh token secrets must differ");
        }
        if access_ttl <= Duration::zero() || refresh_ttl <= Duration::zero() {
            anyhow::bail!("Token lifetimes must be positive");
        }

        tracing::info!("Token service initialized with HS256 keys");

        Ok(Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            access_ttl,
            refresh_ttl,
            clock,
        })
    }

    pub fn mint_pair(&self, subject: &TokenSubject) -> Result<TokenPair, anyhow::Error> {
        let now = self.clock.now();

        let access_claims = AccessTokenClaims {
            sub: subject.user_id,
            username: subject.username.clone(),
            role: subject.role,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let refresh_claims = RefreshTokenClaims {
            sub: subject.user_id,
            token_kind: REFRESH_TOKEN_KIND.to_string(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let header = Header::new(Algorithm::HS256);
        let access_token = encode(&header, &access_claims, &self.access_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))?;
        let refresh_token = encode(&header, &refresh_claims, &self.refresh_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        let claims: AccessTokenClaims = decode_claims(token, &self.access_decoding)?;
        self.check_expiry(claims.exp)?;
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshTokenClaims, TokenError> {
        let claims: RefreshTokenClaims = decode_claims(token, &self.refresh_decoding)?;
        if claims.token_kind != REFRESH_TOKEN_KIND {
            return Err(TokenError::WrongKind);
        }
        self.check_expiry(claims.exp)?;
        Ok(claims)
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    // Expiry follows the injected clock, not the library's wall clock.
    fn check_expiry(&self, exp: i64) -> Result<(), TokenError> {
        if exp <= self.clock.now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(())
    }
}

fn decode_claims<T: DeserializeOwned>(token: &str, key: &DecodingKey) -> Result<T, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;

    decode::<T>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::utils::{Clock, ManualClock};
    use std::sync::Arc;

    const ACCESS_SECRET: &[u8] = b"access-secret-for-tests";
    const REFRESH_SECRET: &[u8] = b"refresh-secret-for-tests";

    fn service() -> (TokenService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let svc = TokenService::new(
            ACCESS_SECRET,
            REFRESH_SECRET,
            Duration::minutes(15),
            Duration::days(7),
            clock.clone(),
        )
        .unwrap();
        (svc, clock)
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: Uuid::new_v4(),
            username: "jdoe".to_string(),
            role: Role::Teacher,
        }
    }

    #[test]
    fn test_access_token_carries_subject() {
        let (svc, _) = service();
        let subject = subject();
        let pair = svc.mint_pair(&subject).unwrap();

        let claims = svc.verify_access(&pair.access_token).unwrap();
        assert_eq!(claims.sub, subject.user_id);
        assert_eq!(claims.username, "jdoe");
        assert_eq!(claims.role, Role::Teacher);
        assert_eq!(pair.expires_in, 900);

        let refresh = svc.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(refresh.sub, subject.user_id);
        assert_eq!(refresh.token_kind, REFRESH_TOKEN_KIND);
    }

    #[test]
    fn test_refresh_claims_signed_with_access_secret_are_rejected() {
        let (svc, clock) = service();
        let now = clock.now();
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &RefreshTokenClaims {
                sub: Uuid::new_v4(),
                token_kind: REFRESH_TOKEN_KIND.to_string(),
                iat: now.timestamp(),
                exp: (now + Duration::days(7)).timestamp(),
                jti: Uuid::new_v4().to_string(),
            },
            &EncodingKey::from_secret(ACCESS_SECRET),
        )
        .unwrap();

        assert_eq!(svc.verify_refresh(&forged), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_tokens_are_not_interchangeable() {
        let (svc, _) = service();
        let pair = svc.mint_pair(&subject()).unwrap();

        assert!(svc.verify_refresh(&pair.access_token).is_err());
        assert!(svc.verify_access(&pair.refresh_token).is_err());
    }

    #[test]
    fn test_missing_token_kind_is_wrong_kind() {
        let (svc, clock) = service();
        let now = clock.now();
        let claims = serde_json::json!({
            "sub": Uuid::new_v4(),
            "iat": now.timestamp(),
            "exp": (now + Duration::days(7)).timestamp(),
            "jti": "x",
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(REFRESH_SECRET),
        )
        .unwrap();

        assert_eq!(svc.verify_refresh(&token), Err(TokenError::WrongKind));
    }

    #[test]
    fn test_access_token_expires_with_clock() {
        let (svc, clock) = service();
        let pair = svc.mint_pair(&subject()).unwrap();

        clock.advance(Duration::minutes(14));
        assert!(svc.verify_access(&pair.access_token).is_ok());

        clock.advance(Duration::minutes(1));
        assert_eq!(
            svc.verify_access(&pair.access_token),
            Err(TokenError::Expired)
        );
        assert!(svc.verify_refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn test_tampered_and_garbage_tokens() {
        let (svc, _) = service();
        let pair = svc.mint_pair(&subject()).unwrap();

        let mut tampered = pair.access_token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'A' { 'B' } else { 'A' });

        assert!(svc.verify_access(&tampered).is_err());
        assert_eq!(svc.verify_access("not.a.jwt"), Err(TokenError::Malformed));
        assert_eq!(svc.verify_access(""), Err(TokenError::Malformed));
    }

    #[test]
    fn test_rotated_refresh_tokens_differ() {
        let (svc, _) = service();
        let subject = subject();
        let a = svc.mint_pair(&subject).unwrap();
        let b = svc.mint_pair(&subject).unwrap();
        assert_ne!(a.refresh_token, b.refresh_token);
    }

    #[test]
    fn test_identical_secrets_are_refused() {
        let clock = Arc::new(ManualClock::default());
        assert!(TokenService::new(
            b"same",
            b"same",
            Duration::minutes(15),
            Duration::days(7),
            clock
        )
        .is_err());
    }
}
