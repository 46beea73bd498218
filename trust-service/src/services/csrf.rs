//! Double-submit CSRF tokens.
//!
//! A token is `raw.signature` where `signature = HMAC-SHA256(secret, raw)`.
//! The client holds it in an HTTP-only cookie and must echo it in the
//! [`CSRF_HEADER`] header on every mutating request.

use service_core::utils::{constant_time_eq, hmac_sha256_hex};

use crate::utils::random_hex;

pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_COOKIE: &str = "csrf_token";

const RAW_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken {
    pub value: String,
    /// `true` when minted by this call and not yet held by the client.
    pub fresh: bool,
}

#[derive(Clone)]
pub struct CsrfGuard {
    secret: Vec<u8>,
}

impl CsrfGuard {
    pub fn new(secret: &[u8]) -> Result<Self, anyhow::Error> {
        if secret.is_empty() {
            anyhow::bail!("CSRF secret must not be empty");
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    /// Returns the client's existing token when it is authentic, else a new one.
    pub fn issue(&self, existing: Option<&str>) -> Result<CsrfToken, anyhow::Error> {
        if let Some(value) = existing.filter(|v| self.is_authentic(v)) {
            return Ok(CsrfToken {
                value: value.to_string(),
                fresh: false,
            });
        }

        let raw = random_hex(RAW_TOKEN_BYTES);
        let signature = hmac_sha256_hex(&self.secret, raw.as_bytes())?;
        Ok(CsrfToken {
            value: format!("{}.{}", raw, signature),
            fresh: true,
        })
    }

    /// Cookie and header must both be present, equal, and carry a valid signature.
    pub fn verify(&self, cookie: Option<&str>, header: Option<&str>) -> bool {
        let (Some(cookie), Some(header)) = (cookie, header) else {
            return false;
        };
        if cookie.is_empty() || header.is_empty() {
            return false;
        }
        if !constant_time_eq(cookie.as_bytes(), header.as_bytes()) {
            return false;
        }
        self.is_authentic(cookie)
    }

    fn is_authentic(&self, token: &str) -> bool {
        let Some((raw, signature)) = token.split_once('.') else {
            return false;
        };
        if raw.is_empty() {
            return false;
        }
        match hmac_sha256_hex(&self.secret, raw.as_bytes()) {
            Ok(expected) => constant_time_eq(signature.as_bytes(), expected.as_bytes()),
            Err(e) => {
                tracing::error!(error = %e, "Failed to compute CSRF signature");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> CsrfGuard {
        CsrfGuard::new(b"csrf-test-secret").unwrap()
    }

    #[test]
    fn test_issued_token_verifies_when_echoed() {
        let guard = guard();
        let token = guard.issue(None).unwrap();

        assert!(token.fresh);
        assert!(guard.verify(Some(&token.value), Some(&token.value)));
    }

    #[test]
    fn test_issue_reuses_authentic_cookie() {
        let guard = guard();
        let first = guard.issue(None).unwrap();
        let second = guard.issue(Some(&first.value)).unwrap();

        assert!(!second.fresh);
        assert_eq!(second.value, first.value);

        let replaced = guard.issue(Some("forged.value")).unwrap();
        assert!(replaced.fresh);
        assert_ne!(replaced.value, "forged.value");
    }

    #[test]
    fn test_mismatch_and_missing_values_fail() {
        let guard = guard();
        let a = guard.issue(None).unwrap().value;
        let b = guard.issue(None).unwrap().value;

        assert!(!guard.verify(Some(&a), Some(&b)));
        assert!(!guard.verify(Some(&a), None));
        assert!(!guard.verify(None, Some(&a)));
        assert!(!guard.verify(Some(""), Some("")));
    }

    #[test]
    fn test_single_flipped_bit_in_signature_fails() {
        let guard = guard();
        let token = guard.issue(None).unwrap().value;

        let mut bytes = token.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(!guard.verify(Some(&tampered), Some(&tampered)));
    }

    #[test]
    fn test_token_from_other_secret_fails() {
        let other = CsrfGuard::new(b"another-secret").unwrap();
        let token = other.issue(None).unwrap().value;

        assert!(!guard().verify(Some(&token), Some(&token)));
    }

    #[test]
    fn test_unsigned_values_fail() {
        let guard = guard();
        assert!(!guard.verify(Some("abc"), Some("abc")));
        assert!(!guard.verify(Some(".abc"), Some(".abc")));
    }
}
