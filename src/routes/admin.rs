/**
 * Admin Routes
 * Platform statistics, course moderation, user management and analytics
 */
use axum::{
    extract::{Path, Query},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::{
    self,
    models::{Category, Course, Role, User, COURSE_COLUMNS, USER_COLUMNS},
};
use crate::error::{ApiError, ApiResult};
use crate::progress::{completion_rate, round_to};
use crate::routes::courses::{summary_select, CourseSummary};
use crate::routes::guard::require_admin;
use crate::routes::users::like_pattern;
use crate::routes::{page_window, parse_id, ApiResponse, Pagination};
use crate::validation::{self, Validator};

// ============================================================================
// Analytics period
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsPeriod {
    Week,
    Month,
    Quarter,
    Year,
    All,
}

impl AnalyticsPeriod {
    /// `7d`, `30d` (default), `90d`, `1y`; anything else covers all time.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("30d") => Self::Month,
            Some("7d") => Self::Week,
            Some("90d") => Self::Quarter,
            Some("1y") => Self::Year,
            Some(_) => Self::All,
        }
    }

    pub fn days(self) -> Option<i64> {
        match self {
            Self::Week => Some(7),
            Self::Month => Some(30),
            Self::Quarter => Some(90),
            Self::Year => Some(365),
            Self::All => None,
        }
    }

    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.days().map(|d| now - Duration::days(d))
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AdminCourseQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub instructor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminUserQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseStatusRequest {
    pub is_approved: Option<bool>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusRequest {
    pub is_active: Option<bool>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_users: i64,
    pub total_students: i64,
    pub total_teachers: i64,
    pub total_courses: i64,
    pub published_courses: i64,
    pub pending_courses: i64,
    pub total_enrollments: i64,
    pub completed_enrollments: i64,
    pub total_revenue: f64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyUsers {
    pub year: i32,
    pub month: i32,
    pub new_users: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopCourse {
    pub id: Uuid,
    pub title: String,
    pub enrollment_count: i64,
    pub rating: f64,
    pub price: f64,
    pub instructor: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub overview: Overview,
    pub monthly_stats: Vec<MonthlyUsers>,
    pub top_courses: Vec<TopCourse>,
}

#[derive(Debug, Serialize)]
pub struct AdminCourseList {
    pub courses: Vec<CourseSummary>,
    pub pagination: Pagination,
}

/// User row with the activity counters relevant to its role.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub user: User,
    pub enrollment_count: i64,
    pub completed_count: i64,
    pub course_count: i64,
    pub student_count: i64,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCounts {
    pub students: i64,
    pub teachers: i64,
    pub admins: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedUserList {
    pub users: Vec<ManagedUser>,
    pub role_counts: RoleCounts,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DailyEnrollments {
    pub date: NaiveDate,
    pub count: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CategoryEnrollments {
    pub category: String,
    pub count: i64,
    pub revenue: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentAnalytics {
    pub period_days: Option<i64>,
    pub daily_enrollments: Vec<DailyEnrollments>,
    pub category_enrollments: Vec<CategoryEnrollments>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: f64,
    pub transactions: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EarningCourse {
    pub id: Uuid,
    pub title: String,
    pub revenue: f64,
    pub enrollments: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueAnalytics {
    pub period_days: Option<i64>,
    pub total_revenue: f64,
    pub revenue_data: Vec<DailyRevenue>,
    pub top_earning_courses: Vec<EarningCourse>,
}

// ============================================================================
// Filters
// ============================================================================

#[derive(Debug, Default, PartialEq)]
struct CourseModerationFilter {
    approved: Option<bool>,
    category: Option<String>,
    instructor: Option<Uuid>,
}

fn course_moderation_filter(query: &AdminCourseQuery) -> ApiResult<CourseModerationFilter> {
    let mut v = Validator::new();
    let mut filter = CourseModerationFilter::default();

    match validation::non_blank(query.status.as_deref()).as_deref() {
        None => {}
        Some("pending") => filter.approved = Some(false),
        Some("approved") => filter.approved = Some(true),
        Some(_) => {
            v.add("status", "Status must be pending or approved");
        }
    }
    if let Some(category) = validation::non_blank(query.category.as_deref()) {
        v.check(category.parse::<Category>().is_ok(), "category", "Invalid category");
        filter.category = Some(category);
    }
    if let Some(instructor) = validation::non_blank(query.instructor.as_deref()) {
        match Uuid::parse_str(&instructor) {
            Ok(id) => filter.instructor = Some(id),
            Err(_) => {
                v.add("instructor", "Invalid instructor ID format");
            }
        }
    }

    v.finish()?;
    Ok(filter)
}

fn push_moderation_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &CourseModerationFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(approved) = filter.approved {
        qb.push(" AND c.is_approved = ").push_bind(approved);
    }
    if let Some(category) = &filter.category {
        qb.push(" AND c.category = ").push_bind(category.clone());
    }
    if let Some(instructor) = filter.instructor {
        qb.push(" AND c.instructor_id = ").push_bind(instructor);
    }
}

#[derive(Debug, Default, PartialEq)]
struct UserFilter {
    role: Option<String>,
    active: Option<bool>,
    search: Option<String>,
}

fn user_filter(query: &AdminUserQuery) -> ApiResult<UserFilter> {
    let mut v = Validator::new();
    let mut filter = UserFilter::default();

    if let Some(role) = validation::non_blank(query.role.as_deref()) {
        v.check(
            role.parse::<Role>().is_ok(),
            "role",
            "Role must be student, teacher or admin",
        );
        filter.role = Some(role);
    }
    match validation::non_blank(query.status.as_deref()).as_deref() {
        None => {}
        Some("active") => filter.active = Some(true),
        Some("inactive") => filter.active = Some(false),
        Some(_) => {
            v.add("status", "Status must be active or inactive");
        }
    }
    filter.search = validation::non_blank(query.search.as_deref()).map(|s| like_pattern(&s));

    v.finish()?;
    Ok(filter)
}

fn push_user_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(role) = &filter.role {
        qb.push(" AND u.role = ").push_bind(role.clone());
    }
    if let Some(active) = filter.active {
        qb.push(" AND u.is_active = ").push_bind(active);
    }
    if let Some(pattern) = &filter.search {
        qb.push(" AND (u.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.email ILIKE ")
            .push_bind(pattern.clone())
            .push(")");
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/admin/stats
pub async fn platform_stats(headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    require_admin(&headers).await?;
    let pool = db::require_pool()?;

    let (total_users, total_students, total_teachers): (i64, i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), \
                COUNT(*) FILTER (WHERE role = 'student'), \
                COUNT(*) FILTER (WHERE role = 'teacher') \
         FROM users",
    )
    .fetch_one(pool.as_ref())
    .await?;

    let (total_courses, published_courses, pending_courses): (i64, i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), \
                COUNT(*) FILTER (WHERE is_published), \
                COUNT(*) FILTER (WHERE NOT is_published) \
         FROM courses",
    )
    .fetch_one(pool.as_ref())
    .await?;

    let (total_enrollments, completed_enrollments, total_revenue): (i64, i64, f64) =
        sqlx::query_as(
            "SELECT COUNT(*), \
                    COUNT(*) FILTER (WHERE completed_at IS NOT NULL), \
                    COALESCE(SUM(amount_paid) FILTER (WHERE payment_status = 'completed'), 0)::FLOAT8 \
             FROM enrollments",
        )
        .fetch_one(pool.as_ref())
        .await?;

    let monthly_stats: Vec<MonthlyUsers> = sqlx::query_as(
        "SELECT EXTRACT(YEAR FROM created_at)::INT4 AS year, \
                EXTRACT(MONTH FROM created_at)::INT4 AS month, \
                COUNT(*) AS new_users \
         FROM users GROUP BY 1, 2 ORDER BY 1 DESC, 2 DESC LIMIT 12",
    )
    .fetch_all(pool.as_ref())
    .await?;

    let top_courses: Vec<TopCourse> = sqlx::query_as(
        "SELECT c.id, c.title, COUNT(e.id) AS enrollment_count, c.rating, c.price, \
                i.name AS instructor \
         FROM courses c \
         JOIN users i ON i.id = c.instructor_id \
         LEFT JOIN enrollments e ON e.course_id = c.id \
         GROUP BY c.id, i.name \
         ORDER BY enrollment_count DESC, c.created_at DESC LIMIT 5",
    )
    .fetch_all(pool.as_ref())
    .await?;

    Ok(ApiResponse::success(PlatformStats {
        overview: Overview {
            total_users,
            total_students,
            total_teachers,
            total_courses,
            published_courses,
            pending_courses,
            total_enrollments,
            completed_enrollments,
            total_revenue: round_to(total_revenue, 2),
            completion_rate: completion_rate(completed_enrollments, total_enrollments),
        },
        monthly_stats,
        top_courses,
    }))
}

/// GET /api/admin/courses
pub async fn list_courses(
    headers: HeaderMap,
    Query(query): Query<AdminCourseQuery>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&headers).await?;
    let window = page_window(query.page, query.limit, 10)?;
    let filter = course_moderation_filter(&query)?;
    let pool = db::require_pool()?;

    let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM courses c");
    push_moderation_filter(&mut count_query, &filter);
    let (total,): (i64,) = count_query
        .build_query_as()
        .fetch_one(pool.as_ref())
        .await?;

    let mut list_query = QueryBuilder::<Postgres>::new(summary_select());
    push_moderation_filter(&mut list_query, &filter);
    list_query
        .push(" ORDER BY c.created_at DESC LIMIT ")
        .push_bind(window.limit)
        .push(" OFFSET ")
        .push_bind(window.offset());
    let courses: Vec<CourseSummary> = list_query
        .build_query_as()
        .fetch_all(pool.as_ref())
        .await?;

    Ok(ApiResponse::success(AdminCourseList {
        courses,
        pagination: window.pagination(total),
    }))
}

/// PUT /api/admin/courses/{id}/status
/// Approval stamps the approver and publishes the course.
pub async fn update_course_status(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<CourseStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let admin = require_admin(&headers).await?;
    let course_id = parse_id(&id, "id")?;

    let mut v = Validator::new();
    v.check(
        payload.is_approved.is_some(),
        "isApproved",
        "isApproved must be a boolean",
    )
    .optional_max_length(
        "rejectionReason",
        payload.rejection_reason.as_deref(),
        500,
        "Rejection reason cannot exceed 500 characters",
    );
    v.finish()?;
    let approved = payload.is_approved.unwrap_or_default();

    let pool = db::require_pool()?;
    let course: Option<Course> = if approved {
        sqlx::query_as(&format!(
            "UPDATE courses SET is_approved = true, approved_at = now(), approved_by = $2, \
                 is_published = true, published_at = COALESCE(published_at, now()), \
                 rejection_reason = NULL, updated_at = now() \
             WHERE id = $1 RETURNING {}",
            COURSE_COLUMNS
        ))
        .bind(course_id)
        .bind(admin.id)
        .fetch_optional(pool.as_ref())
        .await?
    } else {
        sqlx::query_as(&format!(
            "UPDATE courses SET is_approved = false, rejection_reason = $2, updated_at = now() \
             WHERE id = $1 RETURNING {}",
            COURSE_COLUMNS
        ))
        .bind(course_id)
        .bind(validation::non_blank(payload.rejection_reason.as_deref()))
        .fetch_optional(pool.as_ref())
        .await?
    };
    let course = course.ok_or_else(|| ApiError::not_found("Course not found"))?;

    let outcome = if approved { "approved" } else { "rejected" };
    tracing::info!(course_id = %course.id, admin_id = %admin.id, outcome, "course moderated");

    Ok(ApiResponse::success_with_message(
        format!("Course {} successfully", outcome),
        course,
    ))
}

/// GET /api/admin/users
pub async fn list_users(
    headers: HeaderMap,
    Query(query): Query<AdminUserQuery>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&headers).await?;
    let window = page_window(query.page, query.limit, 10)?;
    let filter = user_filter(&query)?;
    let pool = db::require_pool()?;

    let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users u");
    push_user_filter(&mut count_query, &filter);
    let (total,): (i64,) = count_query
        .build_query_as()
        .fetch_one(pool.as_ref())
        .await?;

    let mut list_query = QueryBuilder::<Postgres>::new(format!(
        "SELECT {}, \
             (SELECT COUNT(*) FROM enrollments e WHERE e.student_id = u.id) AS enrollment_count, \
             (SELECT COUNT(*) FROM enrollments e \
              WHERE e.student_id = u.id AND e.completed_at IS NOT NULL) AS completed_count, \
             (SELECT COUNT(*) FROM courses c WHERE c.instructor_id = u.id) AS course_count, \
             (SELECT COUNT(*) FROM enrollments e JOIN courses c ON c.id = e.course_id \
              WHERE c.instructor_id = u.id) AS student_count \
         FROM users u",
        db::qualify(USER_COLUMNS, "u")
    ));
    push_user_filter(&mut list_query, &filter);
    list_query
        .push(" ORDER BY u.created_at DESC LIMIT ")
        .push_bind(window.limit)
        .push(" OFFSET ")
        .push_bind(window.offset());
    let users: Vec<ManagedUser> = list_query
        .build_query_as()
        .fetch_all(pool.as_ref())
        .await?;

    let rows: Vec<(String, i64)> = sqlx::query_as("SELECT role, COUNT(*) FROM users GROUP BY role")
        .fetch_all(pool.as_ref())
        .await?;
    let mut role_counts = RoleCounts::default();
    for (role, count) in rows {
        match role.parse::<Role>() {
            Ok(Role::Student) => role_counts.students = count,
            Ok(Role::Teacher) => role_counts.teachers = count,
            Ok(Role::Admin) => role_counts.admins = count,
            Err(_) => {}
        }
    }

    Ok(ApiResponse::success(ManagedUserList {
        users,
        role_counts,
        pagination: window.pagination(total),
    }))
}

fn validate_user_status(payload: &UserStatusRequest) -> ApiResult<Option<Role>> {
    let mut v = Validator::new();
    let role = match payload.role.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<Role>() {
            Ok(Role::Admin) | Err(_) => {
                v.add("role", "Role must be either student or teacher");
                None
            }
            Ok(role) => Some(role),
        },
    };
    v.finish()?;
    Ok(role)
}

/// PUT /api/admin/users/{id}/status
pub async fn update_user_status(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UserStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let admin = require_admin(&headers).await?;
    let user_id = parse_id(&id, "id")?;
    let role = validate_user_status(&payload)?;
    let pool = db::require_pool()?;

    let current: Option<User> = sqlx::query_as(&format!(
        "SELECT {} FROM users WHERE id = $1",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool.as_ref())
    .await?;
    let current = current.ok_or_else(|| ApiError::not_found("User not found"))?;

    if current.role() == Role::Admin && current.id != admin.id {
        return Err(ApiError::forbidden("Cannot modify admin users"));
    }

    let user: User = sqlx::query_as(&format!(
        "UPDATE users SET is_active = $2, role = $3, updated_at = now() WHERE id = $1 RETURNING {}",
        USER_COLUMNS
    ))
    .bind(user_id)
    .bind(payload.is_active.unwrap_or(current.is_active))
    .bind(role.map(|r| r.as_str().to_string()).unwrap_or(current.role))
    .fetch_one(pool.as_ref())
    .await?;

    tracing::info!(admin_id = %admin.id, user_id = %user.id, active = user.is_active, "user status updated");

    Ok(ApiResponse::success_with_message(
        "User updated successfully",
        user,
    ))
}

/// GET /api/admin/analytics/enrollments
pub async fn enrollment_analytics(
    headers: HeaderMap,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&headers).await?;
    let period = AnalyticsPeriod::parse(query.period.as_deref());
    let since = period.since(Utc::now());
    let pool = db::require_pool()?;

    let daily_enrollments: Vec<DailyEnrollments> = sqlx::query_as(
        "SELECT enrolled_at::DATE AS date, COUNT(*) AS count, \
                COALESCE(SUM(amount_paid), 0)::FLOAT8 AS revenue \
         FROM enrollments \
         WHERE $1::TIMESTAMPTZ IS NULL OR enrolled_at >= $1 \
         GROUP BY 1 ORDER BY 1",
    )
    .bind(since)
    .fetch_all(pool.as_ref())
    .await?;

    let category_enrollments: Vec<CategoryEnrollments> = sqlx::query_as(
        "SELECT c.category, COUNT(*) AS count, \
                COALESCE(SUM(e.amount_paid), 0)::FLOAT8 AS revenue \
         FROM enrollments e JOIN courses c ON c.id = e.course_id \
         WHERE $1::TIMESTAMPTZ IS NULL OR e.enrolled_at >= $1 \
         GROUP BY c.category ORDER BY count DESC",
    )
    .bind(since)
    .fetch_all(pool.as_ref())
    .await?;

    Ok(ApiResponse::success(EnrollmentAnalytics {
        period_days: period.days(),
        daily_enrollments,
        category_enrollments,
    }))
}

/// GET /api/admin/analytics/revenue
pub async fn revenue_analytics(
    headers: HeaderMap,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&headers).await?;
    let period = AnalyticsPeriod::parse(query.period.as_deref());
    let since = period.since(Utc::now());
    let pool = db::require_pool()?;

    let revenue_data: Vec<DailyRevenue> = sqlx::query_as(
        "SELECT enrolled_at::DATE AS date, \
                COALESCE(SUM(amount_paid), 0)::FLOAT8 AS revenue, COUNT(*) AS transactions \
         FROM enrollments \
         WHERE payment_status = 'completed' AND ($1::TIMESTAMPTZ IS NULL OR enrolled_at >= $1) \
         GROUP BY 1 ORDER BY 1",
    )
    .bind(since)
    .fetch_all(pool.as_ref())
    .await?;

    let top_earning_courses: Vec<EarningCourse> = sqlx::query_as(
        "SELECT c.id, c.title, COALESCE(SUM(e.amount_paid), 0)::FLOAT8 AS revenue, \
                COUNT(*) AS enrollments \
         FROM enrollments e JOIN courses c ON c.id = e.course_id \
         WHERE e.payment_status = 'completed' \
           AND ($1::TIMESTAMPTZ IS NULL OR e.enrolled_at >= $1) \
         GROUP BY c.id, c.title ORDER BY revenue DESC LIMIT 10",
    )
    .bind(since)
    .fetch_all(pool.as_ref())
    .await?;

    let total_revenue = round_to(revenue_data.iter().map(|d| d.revenue).sum(), 2);

    Ok(ApiResponse::success(RevenueAnalytics {
        period_days: period.days(),
        total_revenue,
        revenue_data,
        top_earning_courses,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::{get, put};
    use axum::Router;
    use tower::ServiceExt;

    fn admin_router() -> Router {
        Router::new()
            .route("/api/admin/stats", get(platform_stats))
            .route("/api/admin/courses", get(list_courses))
            .route("/api/admin/courses/{id}/status", put(update_course_status))
            .route("/api/admin/users", get(list_users))
            .route("/api/admin/analytics/revenue", get(revenue_analytics))
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!(AnalyticsPeriod::parse(None), AnalyticsPeriod::Month);
        assert_eq!(AnalyticsPeriod::parse(Some("7d")).days(), Some(7));
        assert_eq!(AnalyticsPeriod::parse(Some("1y")).days(), Some(365));
        assert_eq!(AnalyticsPeriod::parse(Some("all")), AnalyticsPeriod::All);
        assert_eq!(AnalyticsPeriod::parse(Some("decade")).days(), None);
    }

    #[test]
    fn test_period_since() {
        let now = Utc::now();
        assert_eq!(
            AnalyticsPeriod::Quarter.since(now),
            Some(now - Duration::days(90))
        );
        assert_eq!(AnalyticsPeriod::All.since(now), None);
    }

    #[test]
    fn test_course_moderation_filter() {
        let query = AdminCourseQuery {
            status: Some("pending".to_string()),
            category: Some("Design".to_string()),
            ..Default::default()
        };
        let filter = course_moderation_filter(&query).unwrap();
        assert_eq!(filter.approved, Some(false));
        assert_eq!(filter.category.as_deref(), Some("Design"));

        let bad = AdminCourseQuery {
            status: Some("archived".to_string()),
            instructor: Some("someone".to_string()),
            ..Default::default()
        };
        match course_moderation_filter(&bad) {
            Err(ApiError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_user_filter() {
        let query = AdminUserQuery {
            role: Some("teacher".to_string()),
            status: Some("inactive".to_string()),
            search: Some("ada".to_string()),
            ..Default::default()
        };
        let filter = user_filter(&query).unwrap();
        assert_eq!(filter.active, Some(false));
        assert_eq!(filter.search.as_deref(), Some("%ada%"));
    }

    #[test]
    fn test_user_status_never_grants_admin() {
        let promote = UserStatusRequest {
            role: Some("admin".to_string()),
            ..Default::default()
        };
        assert!(validate_user_status(&promote).is_err());

        let demote = UserStatusRequest {
            role: Some("student".to_string()),
            is_active: Some(false),
        };
        assert_eq!(validate_user_status(&demote).unwrap(), Some(Role::Student));
        assert_eq!(
            validate_user_status(&UserStatusRequest::default()).unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        for uri in [
            "/api/admin/stats",
            "/api/admin/courses",
            "/api/admin/users",
            "/api/admin/analytics/revenue?period=7d",
        ] {
            let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let res = admin_router().oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }

        let req = Request::builder()
            .method("PUT")
            .uri("/api/admin/courses/3f2504e0-4f89-11d3-9a0c-0305e82c3301/status")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"isApproved":true}"#))
            .unwrap();
        let res = admin_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
