//! Authentication guard middleware.
//!
//! Reads `Authorization: Bearer <token>`, verifies the token, re-checks that
//! the user still exists, and injects an `AuthUser` extension into the request
//! for downstream handlers.

use std::future::Future;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::{
    auth::token::TokenService,
    db::Db,
    errors::{AppError, AppResult},
    models::Role,
    state::AppState,
};

/// Authenticated user resolved from a valid token. Injected into request
/// extensions by `require_auth`; downstream handlers use `Extension<AuthUser>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email:   String,
    pub role:    Role,
}

/// Where the guard looks up the account behind a verified token.
pub trait UserLookup {
    fn find_user(&self, id: &str) -> impl Future<Output = AppResult<Option<AuthUser>>> + Send;
}

impl UserLookup for Db {
    async fn find_user(&self, id: &str) -> AppResult<Option<AuthUser>> {
        #[derive(sqlx::FromRow)]
        struct UserRow {
            id:    String,
            email: String,
            role:  String,
        }

        let Some(row) = sqlx::query_as::<_, UserRow>("SELECT id, email, role FROM users WHERE id = ? LIMIT 1")
            .bind(id)
            .fetch_optional(self)
            .await?
        else {
            return Ok(None);
        };

        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| AppError::internal(format!("user {} has {e}", row.id)))?;
        Ok(Some(AuthUser { user_id: row.id, email: row.email, role }))
    }
}

/// Token part of a `Bearer` authorization header, if there is one.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Resolve the caller from the request headers.
///
/// * no token → 401
/// * bad or expired token → 403
/// * token for a deleted user → 401
///
/// The role is the one stored on the account, not the one in the token.
pub async fn authenticate<L: UserLookup>(
    users: &L,
    tokens: &TokenService,
    headers: &HeaderMap,
) -> AppResult<AuthUser> {
    let token = bearer_token(headers).ok_or(AppError::Unauthenticated)?;

    let claimed = tokens.verify(token).map_err(|err| {
        tracing::debug!(error = %err, "Rejected bearer token");
        AppError::Forbidden
    })?;

    users.find_user(&claimed.id).await?.ok_or(AppError::Unauthenticated)
}

/// Middleware: require a valid bearer token for a user that still exists.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state.pool, &state.tokens, req.headers()).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::http::HeaderValue;

    use super::*;
    use crate::auth::token::tests::{expired_token, identity, service};

    #[derive(Default)]
    struct MemoryUsers(HashMap<String, AuthUser>);

    impl MemoryUsers {
        fn with(user: AuthUser) -> Self {
            let mut users = Self::default();
            users.0.insert(user.user_id.clone(), user);
            users
        }
    }

    impl UserLookup for MemoryUsers {
        async fn find_user(&self, id: &str) -> AppResult<Option<AuthUser>> {
            Ok(self.0.get(id).cloned())
        }
    }

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn extracts_bearer_tokens() {
        assert_eq!(bearer_token(&headers("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(bearer_token(&headers("bearer   xyz ")), Some("xyz"));
    }

    #[test]
    fn ignores_other_schemes_and_empty_tokens() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwdw==")), None);
        assert_eq!(bearer_token(&headers("Bearer")), None);
        assert_eq!(bearer_token(&headers("Bearer    ")), None);
    }

    #[tokio::test]
    async fn valid_token_for_a_deleted_user_is_unauthenticated() {
        let tokens = service();
        let token = tokens.issue(&identity(Role::Admin)).unwrap();

        let err = authenticate(&MemoryUsers::default(), &tokens, &headers(&format!("Bearer {token}")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }

    #[tokio::test]
    async fn role_comes_from_the_account_not_the_token() {
        let tokens = service();
        let claimed = identity(Role::Admin);
        let token = tokens.issue(&claimed).unwrap();
        let users = MemoryUsers::with(AuthUser {
            user_id: claimed.id.clone(),
            email:   claimed.email.clone(),
            role:    Role::Staff,
        });

        let user = authenticate(&users, &tokens, &headers(&format!("Bearer {token}"))).await.unwrap();
        assert_eq!(user.user_id, claimed.id);
        assert_eq!(user.role, Role::Staff);
    }

    #[tokio::test]
    async fn missing_or_bad_tokens_never_reach_the_lookup() {
        let tokens = service();
        let who = identity(Role::Doctor);
        let users = MemoryUsers::with(AuthUser {
            user_id: who.id.clone(),
            email:   who.email.clone(),
            role:    who.role,
        });

        let err = authenticate(&users, &tokens, &HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));

        let expired = expired_token(&tokens, &who);
        let err = authenticate(&users, &tokens, &headers(&format!("Bearer {expired}"))).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }
}
