//! Role-based authorization guard.
//!
//! Each route declares the roles allowed to call it:
//!
//! ```ignore
//! get(list_patients).route_layer(middleware::from_fn_with_state(
//!     Allowed(&[Role::Admin, Role::Doctor, Role::Staff]),
//!     require_role,
//! ))
//! ```

use axum::{
    extract::{Extension, Request, State},
    middleware::Next,
    response::Response,
};

use crate::errors::{AppError, AppResult};
use crate::middleware::auth_guard::AuthUser;
use crate::models::Role;

/// The fixed set of roles permitted for one operation.
#[derive(Debug, Clone, Copy)]
pub struct Allowed(pub &'static [Role]);

impl Allowed {
    pub fn check(self, role: Role) -> AppResult<()> {
        if self.0.contains(&role) {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

/// Middleware: reject callers whose role is not in the route's allow-list.
/// Must run after `require_auth`.
pub async fn require_role(
    State(allowed): State<Allowed>,
    Extension(user): Extension<AuthUser>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Err(err) = allowed.check(user.role) {
        tracing::debug!(user_id = %user.user_id, role = %user.role, "Role not permitted");
        return Err(err);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    use super::*;

    fn admin_only(as_role: Role) -> Router {
        Router::new()
            .route(
                "/patients/stats",
                get(|| async { "ok" }).route_layer(from_fn_with_state(Allowed(&[Role::Admin]), require_role)),
            )
            .layer(Extension(AuthUser {
                user_id: "u1".into(),
                email:   "u1@hospital.test".into(),
                role:    as_role,
            }))
    }

    async fn status_for(role: Role) -> StatusCode {
        let req = HttpRequest::builder().uri("/patients/stats").body(Body::empty()).unwrap();
        admin_only(role).oneshot(req).await.unwrap().status()
    }

    #[test]
    fn membership_decides() {
        let booking = Allowed(&[Role::Admin, Role::Staff]);
        assert!(booking.check(Role::Admin).is_ok());
        assert!(booking.check(Role::Staff).is_ok());
        assert!(matches!(booking.check(Role::Doctor), Err(AppError::Forbidden)));
        assert!(matches!(booking.check(Role::Patient), Err(AppError::Forbidden)));
    }

    #[test]
    fn empty_list_allows_nobody() {
        assert!(Allowed(&[]).check(Role::Admin).is_err());
    }

    #[tokio::test]
    async fn route_rejects_roles_outside_its_list() {
        assert_eq!(status_for(Role::Staff).await, StatusCode::FORBIDDEN);
        assert_eq!(status_for(Role::Doctor).await, StatusCode::FORBIDDEN);
        assert_eq!(status_for(Role::Admin).await, StatusCode::OK);
    }
}
