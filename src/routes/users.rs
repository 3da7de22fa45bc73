/**
 * User Routes
 * Admin user management plus per-user stats, progress and certificates
 */
use axum::{
    extract::{Path, Query},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::{
    self,
    models::{
        Certificate, CourseBrief, Enrollment, Role, User, CERTIFICATE_COLUMNS, COURSE_BRIEF_SELECT,
        ENROLLMENT_COLUMNS, USER_COLUMNS,
    },
};
use crate::error::{is_unique_violation, ApiError, ApiResult};
use crate::progress::round_to;
use crate::routes::guard::{ensure_owner_or_admin, require_admin, require_user, AuthUser};
use crate::routes::{page_window, parse_id, ApiResponse, Pagination};
use crate::validation::{self, Validator};

const OWN_DATA_ONLY: &str = "Access denied. You can only access your own data";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub role: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<User>,
    pub pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledCourseRef {
    pub id: Uuid,
    pub title: String,
    pub price: f64,
    pub instructor_id: Uuid,
    pub instructor_name: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedCourseRef {
    pub id: Uuid,
    pub title: String,
    pub price: f64,
    pub enrolled_students: i64,
}

/// Profile with the courses the user takes and teaches.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub enrolled_courses: Vec<EnrolledCourseRef>,
    pub created_courses: Vec<CreatedCourseRef>,
}

/// Enrollment joined with its course summary.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrolledCourse {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub enrollment: Enrollment,
    #[sqlx(flatten)]
    pub course: CourseBrief,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgressEntry {
    pub course: CourseBrief,
    pub progress: i32,
    pub enrolled_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCertificate {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub certificate: Certificate,
    #[sqlx(flatten)]
    pub course: CourseBrief,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub total_enrollments: i64,
    pub completed_courses: i64,
    pub in_progress_courses: i64,
    pub certificates: i64,
    pub average_progress: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherStats {
    pub total_courses: i64,
    pub published_courses: i64,
    pub total_students: i64,
    pub total_revenue: f64,
    pub average_rating: f64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UserStats {
    Student(StudentStats),
    Teacher(TeacherStats),
    Empty {},
}

// ============================================================================
// Shared queries
// ============================================================================

async fn fetch_user(pool: &PgPool, user_id: Uuid) -> ApiResult<User> {
    let user: Option<User> = sqlx::query_as(&format!(
        "SELECT {} FROM users WHERE id = $1",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    user.ok_or_else(|| ApiError::not_found("User not found"))
}

pub async fn load_user_detail(pool: &PgPool, user_id: Uuid) -> ApiResult<UserDetail> {
    let user = fetch_user(pool, user_id).await?;

    let enrolled_courses: Vec<EnrolledCourseRef> = sqlx::query_as(
        "SELECT c.id, c.title, c.price, c.instructor_id, i.name AS instructor_name \
         FROM enrollments e \
         JOIN courses c ON c.id = e.course_id \
         JOIN users i ON i.id = c.instructor_id \
         WHERE e.student_id = $1 \
         ORDER BY e.enrolled_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let created_courses: Vec<CreatedCourseRef> = sqlx::query_as(
        "SELECT c.id, c.title, c.price, \
                (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) AS enrolled_students \
         FROM courses c \
         WHERE c.instructor_id = $1 \
         ORDER BY c.created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(UserDetail {
        user,
        enrolled_courses,
        created_courses,
    })
}

/// Caller's enrollments with course summaries, newest first.
pub async fn enrolled_courses(pool: &PgPool, student_id: Uuid) -> ApiResult<Vec<EnrolledCourse>> {
    let rows = sqlx::query_as(&format!(
        "SELECT {}, {} \
         FROM enrollments e \
         JOIN courses c ON c.id = e.course_id \
         JOIN users i ON i.id = c.instructor_id \
         WHERE e.student_id = $1 \
         ORDER BY e.enrolled_at DESC",
        db::qualify(ENROLLMENT_COLUMNS, "e"),
        COURSE_BRIEF_SELECT
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

fn validate_update(payload: &UpdateUserRequest) -> ApiResult<()> {
    let mut v = Validator::new();
    if let Some(name) = &payload.name {
        v.length("name", name, 2, 50, "Name must be between 2 and 50 characters")
            .check(
                validation::is_valid_name(name),
                "name",
                "Name can only contain letters and spaces",
            );
    }
    if let Some(email) = &payload.email {
        v.check(
            validation::is_valid_email(email),
            "email",
            "Please provide a valid email address",
        );
    }
    if let Some(role) = &payload.role {
        v.check(
            role.parse::<Role>().is_ok(),
            "role",
            "Role must be student, teacher or admin",
        );
    }
    v.finish()
}

fn progress_entries(rows: Vec<EnrolledCourse>) -> Vec<CourseProgressEntry> {
    let mut entries: Vec<CourseProgressEntry> = rows
        .into_iter()
        .map(|row| CourseProgressEntry {
            is_completed: row.enrollment.is_completed(),
            progress: row.enrollment.progress,
            enrolled_at: row.enrollment.enrolled_at,
            last_accessed_at: row.enrollment.last_accessed_at,
            completed_at: row.enrollment.completed_at,
            course: row.course,
        })
        .collect();
    entries.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
    entries
}

async fn owner_or_admin(headers: &HeaderMap, raw_id: &str) -> ApiResult<(AuthUser, Uuid)> {
    let caller = require_user(headers).await?;
    let user_id = parse_id(raw_id, "id")?;
    ensure_owner_or_admin(&caller, user_id, OWN_DATA_ONLY)?;
    Ok((caller, user_id))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/users
pub async fn list_users(
    headers: HeaderMap,
    Query(query): Query<UserListQuery>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&headers).await?;
    let window = page_window(query.page, query.limit, 10)?;
    let pool = db::require_pool()?;

    let role = validation::non_blank(query.role.as_deref());
    let search = validation::non_blank(query.search.as_deref()).map(|s| like_pattern(&s));

    let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
    push_user_filters(&mut count_query, role.as_deref(), search.as_deref());
    let (total,): (i64,) = count_query
        .build_query_as()
        .fetch_one(pool.as_ref())
        .await?;

    let mut list_query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM users", USER_COLUMNS));
    push_user_filters(&mut list_query, role.as_deref(), search.as_deref());
    list_query
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(window.limit)
        .push(" OFFSET ")
        .push_bind(window.offset());
    let users: Vec<User> = list_query
        .build_query_as()
        .fetch_all(pool.as_ref())
        .await?;

    Ok(ApiResponse::success(UserList {
        users,
        pagination: window.pagination(total),
    }))
}

fn push_user_filters(qb: &mut QueryBuilder<'_, Postgres>, role: Option<&str>, pattern: Option<&str>) {
    qb.push(" WHERE 1 = 1");
    if let Some(role) = role {
        qb.push(" AND role = ").push_bind(role.to_string());
    }
    if let Some(pattern) = pattern {
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.to_string())
            .push(" OR email ILIKE ")
            .push_bind(pattern.to_string())
            .push(")");
    }
}

/// Case-insensitive containment pattern with LIKE wildcards escaped.
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// GET /api/users/{id}
pub async fn get_user(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let (_, user_id) = owner_or_admin(&headers, &id).await?;
    let pool = db::require_pool()?;
    Ok(ApiResponse::success(
        load_user_detail(pool.as_ref(), user_id).await?,
    ))
}

/// PUT /api/users/{id}
pub async fn update_user(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    let admin = require_admin(&headers).await?;
    let user_id = parse_id(&id, "id")?;
    validate_update(&payload)?;

    let pool = db::require_pool()?;
    let current = fetch_user(pool.as_ref(), user_id).await?;

    let name = validation::non_blank(payload.name.as_deref()).unwrap_or(current.name);
    let email = payload
        .email
        .as_deref()
        .map(validation::normalize_email)
        .unwrap_or(current.email);
    let role = payload.role.unwrap_or(current.role);
    let is_active = payload.is_active.unwrap_or(current.is_active);
    let is_verified = payload.is_verified.unwrap_or(current.is_verified);

    let user: User = sqlx::query_as(&format!(
        "UPDATE users SET name = $2, email = $3, role = $4, is_active = $5, is_verified = $6, \
         updated_at = now() WHERE id = $1 RETURNING {}",
        USER_COLUMNS
    ))
    .bind(user_id)
    .bind(&name)
    .bind(&email)
    .bind(&role)
    .bind(is_active)
    .bind(is_verified)
    .fetch_one(pool.as_ref())
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::bad_request("Email already in use")
        } else {
            ApiError::Database(e)
        }
    })?;

    tracing::info!(admin_id = %admin.id, user_id = %user.id, "user updated by admin");

    Ok(ApiResponse::success_with_message(
        "User updated successfully",
        user,
    ))
}

/// DELETE /api/users/{id}
pub async fn delete_user(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let admin = require_admin(&headers).await?;
    let user_id = parse_id(&id, "id")?;
    let pool = db::require_pool()?;

    let user = fetch_user(pool.as_ref(), user_id).await?;
    match user.role() {
        Role::Admin => return Err(ApiError::bad_request("Cannot delete admin users")),
        Role::Teacher => {
            let (enrolled,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM enrollments e \
                 JOIN courses c ON c.id = e.course_id \
                 WHERE c.instructor_id = $1",
            )
            .bind(user_id)
            .fetch_one(pool.as_ref())
            .await?;
            if enrolled > 0 {
                return Err(ApiError::bad_request(
                    "Cannot delete teacher with active course enrollments",
                ));
            }
        }
        Role::Student => {}
    }

    // Courses, enrollments, progress and certificates cascade from the user row.
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool.as_ref())
        .await?;

    tracing::info!(admin_id = %admin.id, %user_id, role = %user.role, "user deleted");

    Ok(ApiResponse::acknowledge("User deleted successfully"))
}

/// GET /api/users/{id}/stats
pub async fn get_user_stats(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let (_, user_id) = owner_or_admin(&headers, &id).await?;
    let pool = db::require_pool()?;
    let user = fetch_user(pool.as_ref(), user_id).await?;

    let stats = match user.role() {
        Role::Student => {
            let (total, completed, average): (i64, i64, f64) = sqlx::query_as(
                "SELECT COUNT(*), \
                        COUNT(*) FILTER (WHERE progress = 100 AND completed_at IS NOT NULL), \
                        COALESCE(AVG(progress), 0)::FLOAT8 \
                 FROM enrollments WHERE student_id = $1",
            )
            .bind(user_id)
            .fetch_one(pool.as_ref())
            .await?;
            let (certificates,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM certificates WHERE student_id = $1")
                    .bind(user_id)
                    .fetch_one(pool.as_ref())
                    .await?;

            UserStats::Student(StudentStats {
                total_enrollments: total,
                completed_courses: completed,
                in_progress_courses: total - completed,
                certificates,
                average_progress: round_to(average, 2),
            })
        }
        Role::Teacher => {
            let (total_courses, published, average_rating): (i64, i64, f64) = sqlx::query_as(
                "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_published), \
                        COALESCE(AVG(rating), 0)::FLOAT8 \
                 FROM courses WHERE instructor_id = $1",
            )
            .bind(user_id)
            .fetch_one(pool.as_ref())
            .await?;
            let (students, revenue): (i64, f64) = sqlx::query_as(
                "SELECT COUNT(*), \
                        COALESCE(SUM(e.amount_paid) FILTER (WHERE e.payment_status = 'completed'), 0)::FLOAT8 \
                 FROM enrollments e JOIN courses c ON c.id = e.course_id \
                 WHERE c.instructor_id = $1",
            )
            .bind(user_id)
            .fetch_one(pool.as_ref())
            .await?;

            UserStats::Teacher(TeacherStats {
                total_courses,
                published_courses: published,
                total_students: students,
                total_revenue: round_to(revenue, 2),
                average_rating: round_to(average_rating, 1),
            })
        }
        Role::Admin => UserStats::Empty {},
    };

    Ok(ApiResponse::success(stats))
}

/// GET /api/users/{id}/progress
pub async fn get_user_progress(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let (_, user_id) = owner_or_admin(&headers, &id).await?;
    let pool = db::require_pool()?;
    let rows = enrolled_courses(pool.as_ref(), user_id).await?;
    Ok(ApiResponse::success(progress_entries(rows)))
}

/// GET /api/users/{id}/certificates
pub async fn get_user_certificates(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let (_, user_id) = owner_or_admin(&headers, &id).await?;
    let pool = db::require_pool()?;

    let certificates: Vec<UserCertificate> = sqlx::query_as(&format!(
        "SELECT {}, {} \
         FROM certificates ct \
         JOIN courses c ON c.id = ct.course_id \
         JOIN users i ON i.id = c.instructor_id \
         WHERE ct.student_id = $1 \
         ORDER BY ct.issued_at DESC",
        db::qualify(CERTIFICATE_COLUMNS, "ct"),
        COURSE_BRIEF_SELECT
    ))
    .bind(user_id)
    .fetch_all(pool.as_ref())
    .await?;

    Ok(ApiResponse::success(certificates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn users_router() -> Router {
        Router::new()
            .route("/api/users", get(list_users))
            .route(
                "/api/users/{id}",
                get(get_user).put(update_user).delete(delete_user),
            )
            .route("/api/users/{id}/stats", get(get_user_stats))
            .route("/api/users/{id}/progress", get(get_user_progress))
            .route("/api/users/{id}/certificates", get(get_user_certificates))
    }

    fn brief() -> CourseBrief {
        CourseBrief {
            id: Uuid::new_v4(),
            title: "Rust for Web".to_string(),
            image: None,
            category: "Web Development".to_string(),
            level: "Beginner".to_string(),
            price: 0.0,
            rating: 0.0,
            instructor_id: Uuid::new_v4(),
            instructor_name: "Grace".to_string(),
        }
    }

    fn enrollment(progress: i32, last_accessed_at: DateTime<Utc>) -> Enrollment {
        let now = Utc::now();
        Enrollment {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            enrolled_at: now,
            completed_at: (progress == 100).then_some(now),
            progress,
            last_accessed_at,
            current_section_id: None,
            current_lesson_id: None,
            certificate_issued: false,
            certificate_issued_at: None,
            payment_status: "completed".to_string(),
            payment_id: None,
            amount_paid: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_user_routes_require_token() {
        for uri in [
            "/api/users",
            "/api/users/00000000-0000-0000-0000-000000000000",
            "/api/users/00000000-0000-0000-0000-000000000000/stats",
            "/api/users/00000000-0000-0000-0000-000000000000/progress",
            "/api/users/00000000-0000-0000-0000-000000000000/certificates",
        ] {
            let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let res = users_router().oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("100%_done"), "%100\\%\\_done%");
    }

    #[test]
    fn test_update_validation() {
        let payload = UpdateUserRequest {
            email: Some("bad".to_string()),
            role: Some("root".to_string()),
            ..Default::default()
        };
        match validate_update(&payload) {
            Err(ApiError::Validation(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["email", "role"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_progress_entries_sorted_by_last_access() {
        let now = Utc::now();
        let rows = vec![
            EnrolledCourse {
                enrollment: enrollment(40, now - chrono::Duration::days(2)),
                course: brief(),
            },
            EnrolledCourse {
                enrollment: enrollment(100, now),
                course: brief(),
            },
        ];
        let entries = progress_entries(rows);
        assert_eq!(entries[0].progress, 100);
        assert!(entries[0].is_completed);
        assert!(!entries[1].is_completed);
    }

    #[test]
    fn test_empty_stats_serialize_as_object() {
        let value = serde_json::to_value(UserStats::Empty {}).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }
}
