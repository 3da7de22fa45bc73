/**
 * Request Guards
 * Bearer-token authentication, role gates and ownership checks used by the
 * protected handlers.
 */
use axum::http::HeaderMap;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{
    self,
    models::{Role, User, USER_COLUMNS},
};
use crate::error::{ApiError, ApiResult};
use crate::routes::auth::verify_access_token;

/// The authenticated caller, loaded fresh from the users table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub avatar: Option<String>,
    pub is_verified: bool,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role(),
            avatar: user.avatar.clone(),
            is_verified: user.is_verified,
        }
    }
}

/// Extract bearer token from Authorization header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the caller or fail with 401.
pub async fn require_user(headers: &HeaderMap) -> ApiResult<AuthUser> {
    let token =
        bearer_token(headers).ok_or_else(|| ApiError::unauthorized("Not authorized, no token"))?;

    let claims = verify_access_token(token)
        .map_err(|_| ApiError::unauthorized("Not authorized, token failed"))?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Not authorized, token failed"))?;

    let pool = db::require_pool()?;
    let user: Option<User> = sqlx::query_as(&format!(
        "SELECT {} FROM users WHERE id = $1",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool.as_ref())
    .await?;

    let user = user.ok_or_else(|| ApiError::unauthorized("User not found"))?;
    if !user.is_active {
        return Err(ApiError::unauthorized("User account is deactivated"));
    }

    Ok(AuthUser::from(&user))
}

/// Caller when a valid token is present; anonymous otherwise.
pub async fn optional_user(headers: &HeaderMap) -> Option<AuthUser> {
    bearer_token(headers)?;
    match require_user(headers).await {
        Ok(user) => Some(user),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring invalid optional credentials");
            None
        }
    }
}

pub fn require_role(user: &AuthUser, roles: &[Role]) -> ApiResult<()> {
    if roles.contains(&user.role) {
        return Ok(());
    }
    let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
    Err(ApiError::forbidden(format!(
        "Access denied. Required role: {}",
        names.join(" or ")
    )))
}

pub async fn require_admin(headers: &HeaderMap) -> ApiResult<AuthUser> {
    let user = require_user(headers).await?;
    require_role(&user, &[Role::Admin])?;
    Ok(user)
}

/// Teacher or admin.
pub async fn require_teacher(headers: &HeaderMap) -> ApiResult<AuthUser> {
    let user = require_user(headers).await?;
    require_role(&user, &[Role::Teacher, Role::Admin])?;
    Ok(user)
}

pub fn ensure_owner_or_admin(user: &AuthUser, owner_id: Uuid, message: &str) -> ApiResult<()> {
    if user.is_admin() || user.id == owner_id {
        Ok(())
    } else {
        Err(ApiError::forbidden(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn user_with(role: Role) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            role,
            avatar: None,
            is_verified: false,
        }
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }

    #[tokio::test]
    async fn test_require_user_without_token() {
        let err = require_user(&HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Not authorized, no token");
    }

    #[tokio::test]
    async fn test_require_user_with_garbage_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer garbage"));
        let err = require_user(&headers).await.unwrap_err();
        assert_eq!(err.to_string(), "Not authorized, token failed");
    }

    #[tokio::test]
    async fn test_optional_user_is_anonymous_without_token() {
        assert!(optional_user(&HeaderMap::new()).await.is_none());
    }

    #[test]
    fn test_role_gate_message() {
        let student = user_with(Role::Student);
        let err = require_role(&student, &[Role::Teacher, Role::Admin]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Access denied. Required role: teacher or admin"
        );
        assert!(require_role(&user_with(Role::Admin), &[Role::Admin]).is_ok());
    }

    #[test]
    fn test_owner_or_admin() {
        let owner = user_with(Role::Teacher);
        let other = user_with(Role::Teacher);
        let admin = user_with(Role::Admin);

        assert!(ensure_owner_or_admin(&owner, owner.id, "nope").is_ok());
        assert!(ensure_owner_or_admin(&admin, owner.id, "nope").is_ok());
        assert!(ensure_owner_or_admin(&other, owner.id, "nope").is_err());
    }
}
