use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};
use tracing::warn;

use crate::db::{self, DbPool};
use crate::error::{AppError, AuthError};
use crate::models::User;
use crate::token::TokenService;
use crate::AppState;

/// Header carrying the session token, both on requests and on the
/// signup/login responses that hand one out.
pub const AUTH_HEADER: &str = "x-auth";

/// A request whose token resolved to a user that still holds it.
#[derive(Debug)]
pub struct Authenticated {
    pub user: User,
    /// The exact token presented, so logout can revoke just this session.
    pub token: String,
}

pub fn authenticate(
    db: &DbPool,
    tokens: &TokenService,
    raw: Option<&str>,
) -> Result<Authenticated, AuthError> {
    let token = raw
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let user_id = tokens.verify(token)?;
    let user = db::find_user_by_id(db, user_id)?.ok_or(AuthError::UnknownUser)?;

    if !user.holds_token(token) {
        return Err(AuthError::RevokedToken);
    }

    Ok(Authenticated {
        user,
        token: token.to_string(),
    })
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match authenticate(&state.db, &state.tokens, presented_token(parts)) {
            Ok(auth) => Ok(auth),
            Err(AuthError::Store(err)) => Err(err),
            Err(reason) => {
                warn!(%reason, "Unauthorized API access attempt");
                Err(AppError::Unauthorized)
            }
        }
    }
}

fn presented_token(parts: &Parts) -> Option<&str> {
    if let Some(value) = parts.headers.get(AUTH_HEADER) {
        return value.to_str().ok();
    }
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use uuid::Uuid;

    use super::*;

    fn setup() -> (DbPool, TokenService, User) {
        let db = db::open_in_memory().unwrap();
        let user = db::create_user(&db, Uuid::new_v4(), "a@b.com", "hash").unwrap();
        (db, TokenService::new("gate-secret"), user)
    }

    #[test]
    fn missing_or_blank_token() {
        let (db, tokens, _) = setup();
        assert!(matches!(
            authenticate(&db, &tokens, None),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(
            authenticate(&db, &tokens, Some("  ")),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn bad_signature() {
        let (db, tokens, user) = setup();
        let forged = TokenService::new("other-secret").sign(user.id).unwrap();
        assert!(matches!(
            authenticate(&db, &tokens, Some(&forged)),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn token_for_unknown_user() {
        let (db, tokens, _) = setup();
        let token = tokens.sign(Uuid::new_v4()).unwrap();
        assert!(matches!(
            authenticate(&db, &tokens, Some(&token)),
            Err(AuthError::UnknownUser)
        ));
    }

    #[test]
    fn signed_but_never_stored_token_is_revoked() {
        let (db, tokens, user) = setup();
        let token = tokens.sign(user.id).unwrap();
        assert!(matches!(
            authenticate(&db, &tokens, Some(&token)),
            Err(AuthError::RevokedToken)
        ));
    }

    #[test]
    fn valid_until_revoked() {
        let (db, tokens, user) = setup();
        let token = tokens.issue(&db, user.id).unwrap();

        let auth = authenticate(&db, &tokens, Some(&token)).unwrap();
        assert_eq!(auth.user.id, user.id);
        assert_eq!(auth.token, token);

        tokens.revoke(&db, user.id, &token).unwrap();
        assert!(matches!(
            authenticate(&db, &tokens, Some(&token)),
            Err(AuthError::RevokedToken)
        ));
    }

    #[test]
    fn other_sessions_survive_a_logout() {
        let (db, tokens, user) = setup();
        let phone = tokens.issue(&db, user.id).unwrap();
        let laptop = tokens.issue(&db, user.id).unwrap();

        tokens.revoke(&db, user.id, &laptop).unwrap();
        assert!(authenticate(&db, &tokens, Some(&phone)).is_ok());
        assert!(authenticate(&db, &tokens, Some(&laptop)).is_err());
    }

    #[test]
    fn token_is_read_from_x_auth_then_bearer() {
        let req = Request::builder()
            .header(AUTH_HEADER, "from-x-auth")
            .header(AUTHORIZATION, "Bearer from-bearer")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(presented_token(&parts), Some("from-x-auth"));

        let req = Request::builder()
            .header(AUTHORIZATION, "Bearer from-bearer")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(presented_token(&parts), Some("from-bearer"));

        let req = Request::builder()
            .header(AUTHORIZATION, "Basic abc")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(presented_token(&parts), None);
    }
}
