use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::db::{self, DbPool};
use crate::error::{AppError, AuthError};
use crate::models::Purpose;

/// Signed session token payload. `jti` keeps two tokens minted for the same
/// user in the same second distinct.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub purpose: Purpose,
    pub jti: Uuid,
    pub iat: i64,
}

/// Mints and checks HS256 session tokens and keeps each user's stored token
/// list in step with what was issued.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Sessions end on logout, not on a clock.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn sign(&self, user_id: Uuid) -> Result<String, AppError> {
        let claims = Claims {
            sub: user_id,
            purpose: Purpose::Access,
            jti: Uuid::new_v4(),
            iat: OffsetDateTime::now_utc().unix_timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "token signed");
        Ok(token)
    }

    /// Signs a token and appends it to the user's stored list.
    pub fn issue(&self, db: &DbPool, user_id: Uuid) -> Result<String, AppError> {
        let token = self.sign(user_id)?;
        db::push_token(db, user_id, &token, Purpose::Access)?;
        Ok(token)
    }

    /// Signature and purpose only; revocation is the caller's concern.
    pub fn verify(&self, token: &str) -> Result<Uuid, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            AuthError::InvalidToken
        })?;
        if data.claims.purpose != Purpose::Access {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims.sub)
    }

    /// Removing a token the user no longer holds is not an error.
    pub fn revoke(&self, db: &DbPool, user_id: Uuid, token: &str) -> Result<(), AppError> {
        let removed = db::pull_token(db, user_id, token)?;
        debug!(user_id = %user_id, removed, "token revoked");
        Ok(())
    }
}
