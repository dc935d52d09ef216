use std::collections::HashSet;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims bound into a verification token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub chat_id: i64,
    pub timestamp: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed verification token")]
    Malformed,
    #[error("verification token signature mismatch")]
    InvalidSignature,
    #[error("could not sign verification token: {0}")]
    Signing(String),
}

/// Issues and checks HS256-signed receipts for saved reports.
///
/// Tokens carry no expiry. Whether the bound chat matches the caller is an
/// authorization question left to the caller; `verify` only answers whether
/// the token is genuine.
#[derive(Clone)]
pub struct VerificationTokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl VerificationTokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Same inputs always yield the same token.
    pub fn issue(&self, chat_id: i64, timestamp: &str) -> Result<String, TokenError> {
        let claims = TokenClaims {
            chat_id,
            timestamp: timestamp.to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        decode::<TokenClaims>(token.trim(), &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: &str = "2026-10-18T09:30:00.123456Z";

    fn service() -> VerificationTokenService {
        VerificationTokenService::new("test-secret")
    }

    /// Flip one character of the signature segment.
    fn tamper_signature(token: &str) -> String {
        let (head, sig) = token.rsplit_once('.').unwrap();
        let mut chars: Vec<char> = sig.chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        format!("{}.{}", head, chars.into_iter().collect::<String>())
    }

    #[test]
    fn issue_verify_roundtrip() {
        let token = service().issue(111, TS).unwrap();
        let claims = service().verify(&token).unwrap();
        assert_eq!(
            claims,
            TokenClaims {
                chat_id: 111,
                timestamp: TS.to_string()
            }
        );
    }

    #[test]
    fn issue_is_deterministic() {
        assert_eq!(service().issue(1, TS).unwrap(), service().issue(1, TS).unwrap());
        assert_ne!(service().issue(1, TS).unwrap(), service().issue(2, TS).unwrap());
    }

    #[test]
    fn altered_signature_is_rejected() {
        let token = service().issue(111, TS).unwrap();
        let forged = tamper_signature(&token);
        assert!(matches!(service().verify(&forged), Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn other_secret_is_rejected() {
        let token = VerificationTokenService::new("someone-else").issue(111, TS).unwrap();
        assert!(matches!(service().verify(&token), Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(service().verify("not-a-token"), Err(TokenError::Malformed)));
        assert!(matches!(service().verify(""), Err(TokenError::Malformed)));
        assert!(matches!(service().verify("a.b.c"), Err(TokenError::Malformed)));
    }

    #[test]
    fn chat_mismatch_still_verifies() {
        // Signature is fine; the chat check belongs to the caller
        let token = service().issue(111, TS).unwrap();
        assert_eq!(service().verify(&token).unwrap().chat_id, 111);
    }
}
