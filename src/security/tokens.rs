//! Access and refresh tokens.
//!
//! Access tokens are HS256 JWTs carrying the SHA-256 of a random fingerprint
//! that is handed to the client separately. Refresh tokens are opaque random
//! strings; only their SHA-256 is stored.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::AccessToken;
use crate::error::{AppError, AppResult};

const RANDOM_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// SHA-256 of the fingerprint, hex encoded
    pub fgp: String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> AppResult<AccessToken> {
        let fingerprint = random_hex();
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.access_ttl.as_secs() as i64,
            fgp: sha256_hex(&fingerprint),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))?;

        Ok(AccessToken {
            token,
            fingerprint,
            expires_in_secs: self.access_ttl.as_secs(),
        })
    }

    /// Verify signature, expiry and fingerprint; returns the subject.
    pub fn verify_access_token(&self, token: &str, fingerprint: &str) -> AppResult<Uuid> {
        let data = decode::<AccessClaims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| AppError::NotAuthenticated)?;

        if data.claims.fgp != sha256_hex(fingerprint) {
            return Err(AppError::NotAuthenticated);
        }

        data.claims
            .sub
            .parse()
            .map_err(|_| AppError::NotAuthenticated)
    }

    /// New opaque refresh token and the hash to store for it.
    pub fn new_refresh_token(&self) -> (String, String) {
        let raw = random_hex();
        let hash = hash_refresh_token(&raw);
        (raw, hash)
    }
}

pub fn hash_refresh_token(raw: &str) -> String {
    sha256_hex(raw)
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn random_hex() -> String {
    let mut bytes = [0u8; RANDOM_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
