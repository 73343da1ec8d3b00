//! Bearer token authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the JWT from the Authorization header
//! 2. Verify its signature and expiry
//! 3. Re-read the user and check the account is still active
//! 4. Inject the authentication context into the request
//!
//! Anything else is rejected with HTTP 401.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::user::{Permission, Role, User, UserStatus},
    services::auth_service,
    state::AppState,
};

/// Authentication context attached to authenticated requests.
///
/// Extract it in handlers with `Extension<AuthContext>`. The role comes
/// from the database, not the token, so role changes apply immediately.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthContext {
    /// Fail with 403 unless the caller's role grants `permission`.
    pub fn require(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.can(permission) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Missing permission: {}",
                permission.name()
            )))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Bearer token authentication middleware function.
///
/// # Flow
///
/// 1. Read `Authorization: Bearer <jwt>`
/// 2. Verify the HS256 signature and `exp`
/// 3. Load the user named by `sub`; it must exist and be `active`
/// 4. Insert `AuthContext` and call the next handler
///
/// # Errors
///
/// `AppError::Unauthorized` (401) for a missing or malformed header, a bad
/// or expired token, or an unknown or inactive user.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or(AppError::Unauthorized)?;

    let claims = auth_service::decode_token(token, &state.config.jwt_secret)?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(claims.sub)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if user.status != UserStatus::Active {
        tracing::debug!(user_id = %user.id, status = ?user.status, "inactive user rejected");
        return Err(AppError::Unauthorized);
    }

    request.extensions_mut().insert(AuthContext {
        user_id: user.id,
        email: user.email,
        role: user.role,
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer   abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
    }

    #[test]
    fn test_require_permission() {
        let viewer = AuthContext {
            user_id: Uuid::new_v4(),
            email: "v@example.com".to_string(),
            role: Role::Viewer,
        };
        assert!(viewer.require(Permission::ViewReports).is_ok());
        assert!(matches!(
            viewer.require(Permission::RunExports),
            Err(AppError::Forbidden(_))
        ));
        assert!(!viewer.is_admin());
    }
}
