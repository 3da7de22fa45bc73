/**
 * Authentication Routes
 * Registration, login, refresh-token rotation, logout and profile management
 */
use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgExecutor;
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::{CONFIG, JWT_SECRET};
use crate::db::{
    self,
    models::{Role, User, USER_COLUMNS},
};
use crate::error::{is_unique_violation, ApiError, ApiResult};
use crate::routes::guard::{require_user, AuthUser};
use crate::routes::{users, ApiResponse};
use crate::validation::{self, Validator};

// ============================================================================
// Configuration
// ============================================================================

pub const TOKEN_ISSUER: &str = "olp-backend";
pub const TOKEN_AUDIENCE: &str = "olp-frontend";

lazy_static::lazy_static! {
    /// Attempt counters keyed by `<scope>:<ip>`, holding (window start, count).
    static ref RATE_LIMIT: Arc<RwLock<HashMap<String, (i64, u32)>>> =
        Arc::new(RwLock::new(HashMap::new()));
}

// ============================================================================
// Types
// ============================================================================

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub name: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub aud: String,
}

/// Tokens handed to the client after register, login and refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: AuthUser,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Generate a random refresh token
fn generate_refresh_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 64)
}

/// SHA-256 hex digest stored in place of the refresh token itself.
fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Create access token
pub fn create_access_token(user: &User) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::minutes(CONFIG.access_token_minutes);

    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: user.role.clone(),
        name: user.name.clone(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
        iss: TOKEN_ISSUER.to_string(),
        aud: TOKEN_AUDIENCE.to_string(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
}

/// Verify and decode access token
pub fn verify_access_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[TOKEN_ISSUER]);
    validation.set_audience(&[TOKEN_AUDIENCE]);

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(JWT_SECRET.as_bytes()),
        &validation,
    )?;
    Ok(token_data.claims)
}

pub async fn hash_password(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || hash(password, DEFAULT_COST))
        .await
        .map_err(|e| ApiError::internal(format!("Password hashing task failed: {}", e)))?
        .map_err(|e| ApiError::internal(format!("Password hashing failed: {}", e)))
}

pub async fn verify_password(password: String, password_hash: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || verify(password, &password_hash).unwrap_or(false))
        .await
        .map_err(|e| ApiError::internal(format!("Password check task failed: {}", e)))
}

/// Persist a fresh refresh token for `user_id` and return its plain value.
async fn store_refresh_token<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: Uuid,
) -> Result<String, sqlx::Error> {
    let token = generate_refresh_token();
    let expires_at = Utc::now() + Duration::days(CONFIG.refresh_token_days);

    sqlx::query(
        "INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3)",
    )
    .bind(user_id)
    .bind(hash_refresh_token(&token))
    .bind(expires_at)
    .execute(executor)
    .await?;

    Ok(token)
}

fn token_pair(user: &User, refresh_token: String) -> ApiResult<TokenPair> {
    let access_token = create_access_token(user)
        .map_err(|e| ApiError::internal(format!("Failed to create access token: {}", e)))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "Bearer",
        expires_in: CONFIG.access_token_minutes * 60,
        user: AuthUser::from(user),
    })
}

/// Fixed-window limiter step. Returns `false` once `key` used up its window.
fn allow_attempt(
    limits: &mut HashMap<String, (i64, u32)>,
    key: &str,
    now: i64,
    max_attempts: u32,
    window_secs: i64,
) -> bool {
    // Evict expired windows so memory tracks active clients only.
    limits.retain(|_, (start, _)| now - *start < window_secs);

    let entry = limits.entry(key.to_string()).or_insert((now, 0));
    if entry.1 >= max_attempts {
        return false;
    }
    entry.1 += 1;
    true
}

/// Check rate limit for an IP.
async fn check_rate_limit(scope: &str, ip: &str) -> bool {
    #[cfg(test)]
    {
        let _ = (scope, ip);
        return true; // Bypass in tests so validation and credentials are exercised
    }

    #[cfg(not(test))]
    {
        let key = format!("{}:{}", scope, ip);
        let mut limits = RATE_LIMIT.write().await;
        allow_attempt(
            &mut limits,
            &key,
            Utc::now().timestamp(),
            CONFIG.auth_rate_limit_max,
            CONFIG.auth_rate_limit_window_secs,
        )
    }
}

fn validate_register(payload: &RegisterRequest) -> ApiResult<()> {
    let mut v = Validator::new();
    v.length(
        "name",
        &payload.name,
        2,
        50,
        "Name must be between 2 and 50 characters",
    )
    .check(
        validation::is_valid_name(&payload.name),
        "name",
        "Name can only contain letters and spaces",
    )
    .check(
        validation::is_valid_email(&payload.email),
        "email",
        "Please provide a valid email address",
    );
    validation::check_password(&mut v, "password", "Password", &payload.password);
    if let Some(role) = &payload.role {
        v.check(
            matches!(role.parse::<Role>(), Ok(Role::Student | Role::Teacher)),
            "role",
            "Role must be either student or teacher",
        );
    }
    v.finish()
}

fn validate_profile(payload: &UpdateProfileRequest) -> ApiResult<()> {
    let mut v = Validator::new();
    if let Some(name) = &payload.name {
        v.length("name", name, 2, 50, "Name must be between 2 and 50 characters")
            .check(
                validation::is_valid_name(name),
                "name",
                "Name can only contain letters and spaces",
            );
    }
    v.optional_max_length(
        "bio",
        payload.bio.as_deref(),
        500,
        "Bio cannot exceed 500 characters",
    )
    .optional_max_length(
        "location",
        payload.location.as_deref(),
        100,
        "Location cannot exceed 100 characters",
    );
    if let Some(website) = validation::non_blank(payload.website.as_deref()) {
        v.check(
            validation::is_valid_url(&website, false),
            "website",
            "Please provide a valid website URL",
        );
    }
    v.finish()
}

async fn find_user_by_id(user_id: Uuid) -> ApiResult<User> {
    let pool = db::require_pool()?;
    let user: Option<User> = sqlx::query_as(&format!(
        "SELECT {} FROM users WHERE id = $1",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool.as_ref())
    .await?;
    user.ok_or_else(|| ApiError::not_found("User not found"))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/register
pub async fn register(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    if !check_rate_limit("register", &addr.ip().to_string()).await {
        return Err(ApiError::TooManyRequests);
    }

    validate_register(&payload)?;
    let pool = db::require_pool()?;

    let email = validation::normalize_email(&payload.email);
    let role = payload
        .role
        .as_deref()
        .and_then(|r| r.parse::<Role>().ok())
        .unwrap_or(Role::Student);

    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(pool.as_ref())
        .await?;
    if exists.is_some() {
        return Err(ApiError::bad_request("User already exists"));
    }

    let password_hash = hash_password(payload.password).await?;

    let mut tx = pool.begin().await?;
    let user: User = sqlx::query_as(&format!(
        "INSERT INTO users (name, email, password_hash, role) VALUES ($1, $2, $3, $4) \
         RETURNING {}",
        USER_COLUMNS
    ))
    .bind(payload.name.trim())
    .bind(&email)
    .bind(&password_hash)
    .bind(role.as_str())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::bad_request("User already exists")
        } else {
            ApiError::Database(e)
        }
    })?;

    let refresh_token = store_refresh_token(&mut *tx, user.id).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, role = %user.role, "user registered");

    let tokens = token_pair(&user, refresh_token)?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::success_with_message("User registered successfully", tokens),
    ))
}

/// POST /api/auth/login
pub async fn login(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let ip = addr.ip().to_string();
    if !check_rate_limit("login", &ip).await {
        tracing::warn!(%ip, "login rate limit exceeded");
        return Err(ApiError::TooManyRequests);
    }

    let mut v = Validator::new();
    v.check(
        validation::is_valid_email(&payload.email),
        "email",
        "Please provide a valid email address",
    )
    .check(!payload.password.is_empty(), "password", "Password is required");
    v.finish()?;

    let pool = db::require_pool()?;
    let email = validation::normalize_email(&payload.email);

    let user: Option<User> = sqlx::query_as(&format!(
        "SELECT {} FROM users WHERE email = $1",
        USER_COLUMNS
    ))
    .bind(&email)
    .fetch_optional(pool.as_ref())
    .await?;

    let verified = match &user {
        Some(user) => verify_password(payload.password, user.password_hash.clone()).await?,
        None => false,
    };
    let user = match user {
        Some(user) if verified => user,
        _ => {
            tracing::warn!(%ip, "failed login attempt");
            return Err(ApiError::unauthorized("Invalid email or password"));
        }
    };

    if !user.is_active {
        return Err(ApiError::unauthorized("User account is deactivated"));
    }

    sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
        .bind(user.id)
        .execute(pool.as_ref())
        .await?;

    let refresh_token = store_refresh_token(pool.as_ref(), user.id).await?;

    tracing::info!(user_id = %user.id, "user logged in");

    let tokens = token_pair(&user, refresh_token)?;
    Ok(ApiResponse::success_with_message("Login successful", tokens))
}

/// POST /api/auth/refresh
/// Exchange a refresh token for a new pair; the presented token is revoked.
pub async fn refresh(Json(payload): Json<RefreshRequest>) -> ApiResult<impl IntoResponse> {
    let presented = payload.refresh_token.trim();
    if presented.is_empty() {
        return Err(ApiError::invalid(
            "refreshToken",
            "Refresh token is required",
        ));
    }

    let pool = db::require_pool()?;
    let mut tx = pool.begin().await?;

    // Claiming the row and revoking it in one statement keeps rotation single-use.
    let claimed: Option<(Uuid,)> = sqlx::query_as(
        "UPDATE refresh_tokens SET revoked = true \
         WHERE token_hash = $1 AND NOT revoked AND expires_at > now() \
         RETURNING user_id",
    )
    .bind(hash_refresh_token(presented))
    .fetch_optional(&mut *tx)
    .await?;

    let (user_id,) =
        claimed.ok_or_else(|| ApiError::unauthorized("Invalid or expired refresh token"))?;

    let user: Option<User> = sqlx::query_as(&format!(
        "SELECT {} FROM users WHERE id = $1",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let user = match user {
        Some(user) if user.is_active => user,
        _ => return Err(ApiError::unauthorized("Invalid or expired refresh token")),
    };

    let refresh_token = store_refresh_token(&mut *tx, user.id).await?;
    tx.commit().await?;

    let tokens = token_pair(&user, refresh_token)?;
    Ok(ApiResponse::success(tokens))
}

/// POST /api/auth/logout
/// Revokes every refresh token held by the caller.
pub async fn logout(headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let user = require_user(&headers).await?;
    let pool = db::require_pool()?;

    let result =
        sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE user_id = $1 AND NOT revoked")
            .bind(user.id)
            .execute(pool.as_ref())
            .await?;

    tracing::info!(
        user_id = %user.id,
        revoked = result.rows_affected(),
        "user logged out"
    );

    Ok(ApiResponse::acknowledge("Logged out successfully"))
}

/// GET /api/auth/profile
pub async fn get_profile(headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let user = require_user(&headers).await?;
    let pool = db::require_pool()?;
    let detail = users::load_user_detail(pool.as_ref(), user.id).await?;
    Ok(ApiResponse::success(detail))
}

/// PUT /api/auth/profile
pub async fn update_profile(
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = require_user(&headers).await?;
    validate_profile(&payload)?;

    let current = find_user_by_id(caller.id).await?;
    let pool = db::require_pool()?;

    let name = validation::non_blank(payload.name.as_deref()).unwrap_or(current.name);
    let merge = |incoming: Option<String>, existing: Option<String>| match incoming {
        Some(value) => validation::non_blank(Some(value.as_str())),
        None => existing,
    };
    let bio = merge(payload.bio, current.bio);
    let website = merge(payload.website, current.website);
    let location = merge(payload.location, current.location);
    let avatar = merge(payload.avatar, current.avatar);

    let user: User = sqlx::query_as(&format!(
        "UPDATE users SET name = $2, bio = $3, website = $4, location = $5, avatar = $6, \
         updated_at = now() WHERE id = $1 RETURNING {}",
        USER_COLUMNS
    ))
    .bind(caller.id)
    .bind(&name)
    .bind(&bio)
    .bind(&website)
    .bind(&location)
    .bind(&avatar)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(ApiResponse::success_with_message(
        "Profile updated successfully",
        user,
    ))
}

/// PUT /api/auth/change-password
pub async fn change_password(
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = require_user(&headers).await?;

    let mut v = Validator::new();
    v.check(
        !payload.current_password.is_empty(),
        "currentPassword",
        "Current password is required",
    );
    validation::check_password(&mut v, "newPassword", "New password", &payload.new_password);
    v.finish()?;

    let user = find_user_by_id(caller.id).await?;
    if !verify_password(payload.current_password, user.password_hash.clone()).await? {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    let password_hash = hash_password(payload.new_password).await?;
    let pool = db::require_pool()?;

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
        .bind(user.id)
        .bind(&password_hash)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE user_id = $1")
        .bind(user.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, "password changed");

    Ok(ApiResponse::acknowledge("Password updated successfully"))
}

/// GET /api/auth/enrolled-courses
pub async fn enrolled_courses(headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let user = require_user(&headers).await?;
    let pool = db::require_pool()?;
    let courses = users::enrolled_courses(pool.as_ref(), user.id).await?;
    Ok(ApiResponse::success(courses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post, put};
    use axum::Router;
    use tower::ServiceExt;

    fn auth_router() -> Router {
        use axum::extract::connect_info::MockConnectInfo;
        Router::new()
            .route("/api/auth/register", post(register))
            .route("/api/auth/login", post(login))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/auth/logout", post(logout))
            .route("/api/auth/profile", get(get_profile).put(update_profile))
            .route("/api/auth/change-password", put(change_password))
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 12345))))
    }

    async fn send_json(
        app: Router,
        method: &str,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: String::new(),
            role: "teacher".to_string(),
            avatar: None,
            bio: None,
            website: None,
            location: None,
            is_active: true,
            is_verified: false,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let user = sample_user();
        let token = create_access_token(&user).unwrap();
        let claims = verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, "teacher");
        assert_eq!(claims.name, "Ada Lovelace");
        assert_eq!(claims.iss, TOKEN_ISSUER);
        assert_eq!(claims.aud, TOKEN_AUDIENCE);
    }

    #[test]
    fn test_verify_rejects_expired_and_foreign_tokens() {
        let now = Utc::now().timestamp();
        let sign = |claims: &Claims| {
            encode(
                &Header::new(Algorithm::HS256),
                claims,
                &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
            )
            .unwrap()
        };
        let mut claims = Claims {
            sub: Uuid::new_v4().to_string(),
            email: "a@b.io".to_string(),
            role: "student".to_string(),
            name: "A".to_string(),
            exp: now - 3600,
            iat: now - 7200,
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
        };
        assert!(verify_access_token(&sign(&claims)).is_err());

        claims.exp = now + 3600;
        claims.aud = "someone-else".to_string();
        assert!(verify_access_token(&sign(&claims)).is_err());

        assert!(verify_access_token("invalid.token.here").is_err());
    }

    #[test]
    fn test_refresh_token_shape_and_hash() {
        let token = generate_refresh_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));

        let digest = hash_refresh_token(&token);
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_refresh_token(&token));
        assert_ne!(digest, hash_refresh_token("other"));
    }

    #[test]
    fn test_rate_limit_window() {
        let mut limits = HashMap::new();
        assert!(allow_attempt(&mut limits, "login:1.2.3.4", 0, 2, 60));
        assert!(allow_attempt(&mut limits, "login:1.2.3.4", 10, 2, 60));
        assert!(!allow_attempt(&mut limits, "login:1.2.3.4", 20, 2, 60));
        assert!(allow_attempt(&mut limits, "login:5.6.7.8", 20, 2, 60));
        // window rolled over
        assert!(allow_attempt(&mut limits, "login:1.2.3.4", 61, 2, 60));
    }

    #[tokio::test]
    async fn test_register_validation_lists_fields() {
        let (status, body) = send_json(
            auth_router(),
            "POST",
            "/api/auth/register",
            serde_json::json!({"name": "R2-D2", "email": "nope", "password": "short"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        let fields: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert!(fields.contains(&"name"));
        assert!(fields.contains(&"email"));
        assert!(fields.contains(&"password"));
    }

    #[tokio::test]
    async fn test_register_rejects_admin_role() {
        let (status, body) = send_json(
            auth_router(),
            "POST",
            "/api/auth/register",
            serde_json::json!({
                "name": "Eve Admin",
                "email": "eve@example.com",
                "password": "Secret123",
                "role": "admin"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["field"], "role");
    }

    #[tokio::test]
    async fn test_register_valid_without_database_is_unavailable() {
        let (status, body) = send_json(
            auth_router(),
            "POST",
            "/api/auth/register",
            serde_json::json!({
                "name": "Ada Lovelace",
                "email": "ada@example.com",
                "password": "Secret123"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["message"], "Database not available");
    }

    #[tokio::test]
    async fn test_login_empty_password_returns_bad_request() {
        let (status, body) = send_json(
            auth_router(),
            "POST",
            "/api/auth/login",
            serde_json::json!({"email": "ada@example.com", "password": ""}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["message"], "Password is required");
    }

    #[tokio::test]
    async fn test_login_invalid_email_format_returns_bad_request() {
        let (status, _) = send_json(
            auth_router(),
            "POST",
            "/api/auth/login",
            serde_json::json!({"email": "not-an-email", "password": "whatever"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refresh_empty_token_returns_bad_request() {
        let (status, body) = send_json(
            auth_router(),
            "POST",
            "/api/auth/refresh",
            serde_json::json!({"refreshToken": ""}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["field"], "refreshToken");
    }

    #[tokio::test]
    async fn test_logout_requires_token() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/logout")
            .body(Body::empty())
            .unwrap();
        let res = auth_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_profile_requires_token() {
        let req = Request::builder()
            .uri("/api/auth/profile")
            .body(Body::empty())
            .unwrap();
        let res = auth_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_change_password_checks_token_before_body() {
        let (status, body) = send_json(
            auth_router(),
            "PUT",
            "/api/auth/change-password",
            serde_json::json!({"currentPassword": "", "newPassword": "weak"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Not authorized, no token");
    }

    #[test]
    fn test_profile_validation() {
        let payload = UpdateProfileRequest {
            bio: Some("x".repeat(501)),
            website: Some("not a url".to_string()),
            ..Default::default()
        };
        match validate_profile(&payload) {
            Err(ApiError::Validation(errors)) => {
                assert_eq!(errors[0].field, "bio");
                assert_eq!(errors[1].field, "website");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(validate_profile(&UpdateProfileRequest::default()).is_ok());
    }

    #[test]
    fn test_profile_name_follows_register_rules() {
        let payload = UpdateProfileRequest {
            name: Some("R2-D2".to_string()),
            ..Default::default()
        };
        match validate_profile(&payload) {
            Err(ApiError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "name");
                assert_eq!(errors[0].message, "Name can only contain letters and spaces");
            }
            other => panic!("expected validation error, got {:?}", other),
        }

        let payload = UpdateProfileRequest {
            name: Some("Ada Lovelace".to_string()),
            ..Default::default()
        };
        assert!(validate_profile(&payload).is_ok());
    }
}
