//! crates/thinkpath_core/src/token.rs
//!
//! Stateless session tokens: `header.payload.signature`, each segment base64url
//! without padding, signed with HMAC-SHA256 over `header.payload`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;

use crate::domain::{Identity, TokenClaims};
use crate::error::{TutorError, TutorResult};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// Issues and verifies tokens with a server-held secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl,
        }
    }

    /// Issues a token for `identity` that expires `ttl` after `now`.
    pub fn issue(&self, identity: &Identity, now: DateTime<Utc>) -> TutorResult<String> {
        let iat = now.timestamp_millis();
        let claims = TokenClaims {
            sub: identity.id,
            name: identity.name.clone(),
            iat,
            exp: iat + self.ttl.num_milliseconds(),
        };
        let header = TokenHeader {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };

        let header = encode_segment(&header)?;
        let payload = encode_segment(&claims)?;
        let signing_input = format!("{header}.{payload}");
        let signature = URL_SAFE_NO_PAD.encode(self.sign(signing_input.as_bytes())?);
        Ok(format!("{signing_input}.{signature}"))
    }

    /// Returns the claims of a token whose signature verifies and which has not expired.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> TutorResult<TokenClaims> {
        let mut segments = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (segments.next(), segments.next(), segments.next(), segments.next())
        else {
            return Err(TutorError::InvalidToken);
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TutorError::InvalidToken)?;
        let mut mac = self.mac()?;
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        // Constant-time comparison
        mac.verify_slice(&signature)
            .map_err(|_| TutorError::InvalidToken)?;

        let header: TokenHeader = decode_segment(header)?;
        if header.alg != ALGORITHM {
            return Err(TutorError::InvalidToken);
        }
        let claims: TokenClaims = decode_segment(payload)?;
        if now.timestamp_millis() >= claims.exp {
            return Err(TutorError::InvalidToken);
        }
        Ok(claims)
    }

    fn mac(&self) -> TutorResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| TutorError::Internal(e.to_string()))
    }

    fn sign(&self, input: &[u8]) -> TutorResult<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(input);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn encode_segment<T: Serialize>(value: &T) -> TutorResult<String> {
    let json = serde_json::to_vec(value).map_err(|e| TutorError::Internal(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> TutorResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TutorError::InvalidToken)?;
    serde_json::from_slice(&bytes).map_err(|_| TutorError::InvalidToken)
}
