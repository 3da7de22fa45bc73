/**
 * Course Routes
 * Catalogue browsing, course authoring (sections and lessons) and reviews
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json as SqlJson, FromRow, PgExecutor, Postgres, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

use crate::db::{
    self,
    models::{
        Category, Course, CourseLesson, CourseReview, CourseSection, Enrollment, LessonResource,
        Level, COURSE_COLUMNS, ENROLLMENT_COLUMNS,
    },
};
use crate::error::{is_unique_violation, ApiError, ApiResult};
use crate::progress::average_rating;
use crate::routes::guard::{optional_user, require_teacher, require_user, AuthUser};
use crate::routes::users::like_pattern;
use crate::routes::{page_window, parse_id, ApiResponse, Pagination};
use crate::validation::{self, Validator};

pub const DEFAULT_COURSE_LIMIT: i64 = 12;
pub const MAX_PRICE: f64 = 9999.99;

const SORT_OPTIONS: &[&str] = &["newest", "oldest", "popular", "rating", "price-low", "price-high"];

/// Instructor columns aliased for joining beside a course row.
const INSTRUCTOR_SELECT: &str = "i.id AS instructor_ref, i.name AS instructor_name, \
     i.email AS instructor_email, i.avatar AS instructor_avatar, i.bio AS instructor_bio";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseListQuery {
    pub category: Option<String>,
    pub level: Option<String>,
    pub price_range: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub rating: Option<f64>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Validated catalogue filters.
#[derive(Debug, Default, PartialEq)]
struct CourseFilters {
    category: Option<String>,
    level: Option<String>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    min_rating: Option<f64>,
    search: Option<String>,
    sort: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub price: Option<f64>,
    pub image: Option<String>,
    pub requirements: Option<Vec<String>>,
    pub what_you_will_learn: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRequest {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub order: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRequest {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<i32>,
    pub order: Option<i32>,
    #[serde(default)]
    pub resources: Vec<LessonResource>,
    #[serde(default)]
    pub is_preview: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    pub rating: Option<i32>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructorInfo {
    #[sqlx(rename = "instructor_ref")]
    pub id: Uuid,
    #[sqlx(rename = "instructor_name")]
    pub name: String,
    #[sqlx(rename = "instructor_email")]
    pub email: String,
    #[sqlx(rename = "instructor_avatar")]
    pub avatar: Option<String>,
    #[sqlx(rename = "instructor_bio")]
    pub bio: Option<String>,
}

/// Catalogue row: course, instructor and counters, without sections.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub course: Course,
    #[sqlx(flatten)]
    pub instructor: InstructorInfo,
    pub enrolled_count: i64,
    pub review_count: i64,
}

#[derive(Debug, Serialize)]
pub struct CourseList {
    pub courses: Vec<CourseSummary>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionWithLessons {
    #[serde(flatten)]
    pub section: CourseSection,
    pub lessons: Vec<CourseLesson>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewWithStudent {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub review: CourseReview,
    pub student_name: String,
    pub student_avatar: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDetail {
    #[serde(flatten)]
    pub summary: CourseSummary,
    pub sections: Vec<SectionWithLessons>,
    pub reviews: Vec<ReviewWithStudent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseView {
    pub course: CourseDetail,
    pub is_enrolled: bool,
    pub enrollment: Option<Enrollment>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StudentRef {
    #[serde(skip)]
    pub course_id: Uuid,
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherCourse {
    #[serde(flatten)]
    pub course: Course,
    pub enrolled_students: Vec<StudentRef>,
}

#[derive(Debug, Serialize)]
pub struct TeacherCourseList {
    pub courses: Vec<TeacherCourse>,
    pub pagination: Pagination,
}

// ============================================================================
// Filters and validation
// ============================================================================

/// Parse `free`, `min-max` or `min+` into inclusive price bounds.
pub fn parse_price_range(range: &str) -> Option<(Option<f64>, Option<f64>)> {
    let range = range.trim();
    if range.eq_ignore_ascii_case("free") {
        return Some((Some(0.0), Some(0.0)));
    }
    if let Some(min) = range.strip_suffix('+') {
        let min: f64 = min.trim().parse().ok()?;
        return (min >= 0.0).then_some((Some(min), None));
    }
    let (min, max) = range.split_once('-')?;
    let min: f64 = min.trim().parse().ok()?;
    let max: f64 = max.trim().parse().ok()?;
    (min >= 0.0 && max >= min).then_some((Some(min), Some(max)))
}

fn sort_clause(sort: &str) -> &'static str {
    match sort {
        "oldest" => "c.created_at ASC",
        "popular" => "enrolled_count DESC, c.created_at DESC",
        "rating" => "c.rating DESC, c.created_at DESC",
        "price-low" => "c.price ASC, c.created_at DESC",
        "price-high" => "c.price DESC, c.created_at DESC",
        _ => "c.created_at DESC",
    }
}

fn course_filters(query: &CourseListQuery) -> ApiResult<CourseFilters> {
    let mut v = Validator::new();
    let mut filters = CourseFilters {
        sort: "newest",
        ..Default::default()
    };

    if let Some(category) = validation::non_blank(query.category.as_deref()) {
        v.check(category.parse::<Category>().is_ok(), "category", "Invalid category");
        filters.category = Some(category);
    }
    if let Some(level) = validation::non_blank(query.level.as_deref()) {
        v.check(level.parse::<Level>().is_ok(), "level", "Invalid level");
        filters.level = Some(level);
    }
    if let Some(range) = validation::non_blank(query.price_range.as_deref()) {
        match parse_price_range(&range) {
            Some((min, max)) => {
                filters.min_price = min;
                filters.max_price = max;
            }
            None => {
                v.add("priceRange", "Invalid price range");
            }
        }
    }
    if let Some(min) = query.min_price {
        v.check(min >= 0.0, "minPrice", "Minimum price must be non-negative");
        filters.min_price = Some(filters.min_price.map_or(min, |m| m.max(min)));
    }
    if let Some(max) = query.max_price {
        v.check(max >= 0.0, "maxPrice", "Maximum price must be non-negative");
        filters.max_price = Some(filters.max_price.map_or(max, |m| m.min(max)));
    }
    if let Some(rating) = query.rating {
        v.check(
            (0.0..=5.0).contains(&rating),
            "rating",
            "Rating must be between 0 and 5",
        );
        filters.min_rating = Some(rating);
    }
    if let Some(search) = &query.search {
        v.length("search", search, 1, 100, "Search term must be between 1 and 100 characters");
        filters.search = validation::non_blank(Some(search.as_str())).map(|s| like_pattern(&s));
    }
    if let Some(sort) = validation::non_blank(query.sort_by.as_deref()) {
        match SORT_OPTIONS.iter().find(|option| **option == sort) {
            Some(option) => filters.sort = *option,
            None => {
                v.add("sortBy", "Invalid sort option");
            }
        }
    }

    v.finish()?;
    Ok(filters)
}

fn push_course_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &CourseFilters) {
    qb.push(" WHERE c.is_published AND c.is_approved");
    if let Some(category) = &filters.category {
        qb.push(" AND c.category = ").push_bind(category.clone());
    }
    if let Some(level) = &filters.level {
        qb.push(" AND c.level = ").push_bind(level.clone());
    }
    if let Some(min) = filters.min_price {
        qb.push(" AND c.price >= ").push_bind(min);
    }
    if let Some(max) = filters.max_price {
        qb.push(" AND c.price <= ").push_bind(max);
    }
    if let Some(rating) = filters.min_rating {
        qb.push(" AND c.rating >= ").push_bind(rating);
    }
    if let Some(pattern) = &filters.search {
        qb.push(" AND (c.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR c.description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM unnest(c.tags) AS tag WHERE tag ILIKE ")
            .push_bind(pattern.clone())
            .push("))");
    }
}

fn check_items(v: &mut Validator, field: &str, items: Option<&[String]>, message: &str) {
    if let Some(items) = items {
        v.check(items.iter().all(|i| i.trim().chars().count() <= 200), field, message);
    }
}

/// Course rules; `partial` skips the required-field checks for updates.
fn validate_course(payload: &CourseRequest, partial: bool) -> ApiResult<()> {
    let mut v = Validator::new();

    match &payload.title {
        Some(title) => {
            v.length("title", title, 5, 100, "Course title must be between 5 and 100 characters");
        }
        None if !partial => {
            v.add("title", "Course title must be between 5 and 100 characters");
        }
        None => {}
    }
    match &payload.description {
        Some(description) => {
            v.length(
                "description",
                description,
                50,
                2000,
                "Course description must be between 50 and 2000 characters",
            );
        }
        None if !partial => {
            v.add("description", "Course description must be between 50 and 2000 characters");
        }
        None => {}
    }
    match &payload.category {
        Some(category) => {
            v.check(
                category.parse::<Category>().is_ok(),
                "category",
                "Please select a valid category",
            );
        }
        None if !partial => {
            v.add("category", "Please select a valid category");
        }
        None => {}
    }
    match &payload.level {
        Some(level) => {
            v.check(level.parse::<Level>().is_ok(), "level", "Please select a valid level");
        }
        None if !partial => {
            v.add("level", "Please select a valid level");
        }
        None => {}
    }
    match payload.price {
        Some(price) => {
            v.check(
                (0.0..=MAX_PRICE).contains(&price),
                "price",
                "Price must be between 0 and 9999.99",
            );
        }
        None if !partial => {
            v.add("price", "Price must be between 0 and 9999.99");
        }
        None => {}
    }

    check_items(
        &mut v,
        "requirements",
        payload.requirements.as_deref(),
        "Each requirement cannot exceed 200 characters",
    );
    check_items(
        &mut v,
        "whatYouWillLearn",
        payload.what_you_will_learn.as_deref(),
        "Each learning outcome cannot exceed 200 characters",
    );

    v.finish()
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .filter_map(|i| validation::non_blank(Some(i.as_str())))
        .collect()
}

/// Lower-cased, de-duplicated tags in first-seen order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    seen
}

fn validate_section(payload: &SectionRequest) -> ApiResult<()> {
    let mut v = Validator::new();
    v.length(
        "title",
        &payload.title,
        3,
        100,
        "Section title must be between 3 and 100 characters",
    )
    .optional_max_length(
        "description",
        payload.description.as_deref(),
        500,
        "Section description cannot exceed 500 characters",
    );
    if let Some(order) = payload.order {
        v.check(order >= 0, "order", "Order must be a non-negative integer");
    }
    v.finish()
}

fn validate_lesson(payload: &LessonRequest) -> ApiResult<()> {
    let mut v = Validator::new();
    v.length(
        "title",
        &payload.title,
        3,
        100,
        "Lesson title must be between 3 and 100 characters",
    )
    .optional_max_length(
        "description",
        payload.description.as_deref(),
        1000,
        "Lesson description cannot exceed 1000 characters",
    );
    if let Some(url) = &payload.video_url {
        v.check(
            validation::is_valid_url(url, true),
            "videoUrl",
            "Please provide a valid video URL",
        );
    }
    if let Some(duration) = payload.duration {
        v.check(duration >= 1, "duration", "Duration must be at least 1 minute");
    }
    if let Some(order) = payload.order {
        v.check(order >= 0, "order", "Order must be a non-negative integer");
    }
    v.finish()
}

fn validate_review(payload: &ReviewRequest) -> ApiResult<i32> {
    let mut v = Validator::new();
    let rating = payload.rating.unwrap_or(0);
    v.check((1..=5).contains(&rating), "rating", "Rating must be between 1 and 5")
        .optional_max_length(
            "comment",
            payload.comment.as_deref(),
            500,
            "Comment cannot exceed 500 characters",
        );
    v.finish()?;
    Ok(rating)
}

// ============================================================================
// Shared queries
// ============================================================================

pub async fn fetch_course<'e, E: PgExecutor<'e>>(executor: E, course_id: Uuid) -> ApiResult<Course> {
    let course: Option<Course> = sqlx::query_as(&format!(
        "SELECT {} FROM courses WHERE id = $1",
        COURSE_COLUMNS
    ))
    .bind(course_id)
    .fetch_optional(executor)
    .await?;
    course.ok_or_else(|| ApiError::not_found("Course not found"))
}

pub async fn find_enrollment<'e, E: PgExecutor<'e>>(
    executor: E,
    student_id: Uuid,
    course_id: Uuid,
) -> ApiResult<Option<Enrollment>> {
    let enrollment = sqlx::query_as(&format!(
        "SELECT {} FROM enrollments WHERE student_id = $1 AND course_id = $2",
        ENROLLMENT_COLUMNS
    ))
    .bind(student_id)
    .bind(course_id)
    .fetch_optional(executor)
    .await?;
    Ok(enrollment)
}

/// Load a course the caller may manage, or fail with 404/403.
async fn manageable_course(caller: &AuthUser, raw_id: &str, action: &str) -> ApiResult<Course> {
    let course_id = parse_id(raw_id, "id")?;
    let pool = db::require_pool()?;
    let course = fetch_course(pool.as_ref(), course_id).await?;
    if !caller.is_admin() && course.instructor_id != caller.id {
        return Err(ApiError::forbidden(format!(
            "Not authorized to {} this course",
            action
        )));
    }
    Ok(course)
}

/// Sum lesson durations into the course row.
async fn recompute_total_duration<'e, E: PgExecutor<'e>>(
    executor: E,
    course_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE courses SET total_duration = \
         COALESCE((SELECT SUM(duration) FROM course_lessons WHERE course_id = $1), 0), \
         updated_at = now() WHERE id = $1",
    )
    .bind(course_id)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) fn summary_select() -> String {
    format!(
        "SELECT {}, {}, \
         (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) AS enrolled_count, \
         (SELECT COUNT(*) FROM course_reviews r WHERE r.course_id = c.id) AS review_count \
         FROM courses c JOIN users i ON i.id = c.instructor_id",
        db::qualify(COURSE_COLUMNS, "c"),
        INSTRUCTOR_SELECT
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/courses
pub async fn list_courses(Query(query): Query<CourseListQuery>) -> ApiResult<impl IntoResponse> {
    let window = page_window(query.page, query.limit, DEFAULT_COURSE_LIMIT)?;
    let filters = course_filters(&query)?;
    let pool = db::require_pool()?;

    let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM courses c");
    push_course_filters(&mut count_query, &filters);
    let (total,): (i64,) = count_query
        .build_query_as()
        .fetch_one(pool.as_ref())
        .await?;

    let mut list_query = QueryBuilder::<Postgres>::new(summary_select());
    push_course_filters(&mut list_query, &filters);
    list_query
        .push(" ORDER BY ")
        .push(sort_clause(filters.sort))
        .push(" LIMIT ")
        .push_bind(window.limit)
        .push(" OFFSET ")
        .push_bind(window.offset());
    let courses: Vec<CourseSummary> = list_query
        .build_query_as()
        .fetch_all(pool.as_ref())
        .await?;

    Ok(ApiResponse::success(CourseList {
        courses,
        pagination: window.pagination(total),
    }))
}

/// GET /api/courses/{id}
pub async fn get_course(headers: HeaderMap, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let course_id = parse_id(&id, "id")?;
    let caller = optional_user(&headers).await;
    let pool = db::require_pool()?;

    let summary: Option<CourseSummary> =
        sqlx::query_as(&format!("{} WHERE c.id = $1", summary_select()))
            .bind(course_id)
            .fetch_optional(pool.as_ref())
            .await?;
    let summary = summary.ok_or_else(|| ApiError::not_found("Course not found"))?;

    // Drafts and unapproved courses stay hidden from everyone but their managers.
    let can_manage = caller
        .as_ref()
        .is_some_and(|u| u.is_admin() || u.id == summary.course.instructor_id);
    if !summary.course.is_available() && !can_manage {
        return Err(ApiError::not_found("Course not found"));
    }

    let sections: Vec<CourseSection> = sqlx::query_as(
        "SELECT id, course_id, title, description, position, created_at, updated_at \
         FROM course_sections WHERE course_id = $1 ORDER BY position, created_at",
    )
    .bind(course_id)
    .fetch_all(pool.as_ref())
    .await?;

    let lessons: Vec<CourseLesson> = sqlx::query_as(
        "SELECT id, section_id, course_id, title, description, video_url, duration, resources, \
                is_preview, position, created_at, updated_at \
         FROM course_lessons WHERE course_id = $1 ORDER BY position, created_at",
    )
    .bind(course_id)
    .fetch_all(pool.as_ref())
    .await?;

    let reviews: Vec<ReviewWithStudent> = sqlx::query_as(
        "SELECT r.id, r.course_id, r.student_id, r.rating, r.comment, r.created_at, r.updated_at, \
                u.name AS student_name, u.avatar AS student_avatar \
         FROM course_reviews r JOIN users u ON u.id = r.student_id \
         WHERE r.course_id = $1 ORDER BY r.created_at DESC",
    )
    .bind(course_id)
    .fetch_all(pool.as_ref())
    .await?;

    let enrollment = match &caller {
        Some(user) => find_enrollment(pool.as_ref(), user.id, course_id).await?,
        None => None,
    };

    Ok(ApiResponse::success(CourseView {
        course: CourseDetail {
            summary,
            sections: nest_lessons(sections, lessons),
            reviews,
        },
        is_enrolled: enrollment.is_some(),
        enrollment,
    }))
}

fn nest_lessons(sections: Vec<CourseSection>, lessons: Vec<CourseLesson>) -> Vec<SectionWithLessons> {
    let mut by_section: HashMap<Uuid, Vec<CourseLesson>> = HashMap::new();
    for lesson in lessons {
        by_section.entry(lesson.section_id).or_default().push(lesson);
    }
    sections
        .into_iter()
        .map(|section| SectionWithLessons {
            lessons: by_section.remove(&section.id).unwrap_or_default(),
            section,
        })
        .collect()
}

/// POST /api/courses
pub async fn create_course(
    headers: HeaderMap,
    Json(payload): Json<CourseRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = require_teacher(&headers).await?;
    validate_course(&payload, false)?;
    let pool = db::require_pool()?;

    let course: Course = sqlx::query_as(&format!(
        "INSERT INTO courses (title, description, instructor_id, category, level, price, image, \
             requirements, what_you_will_learn, tags, is_published, is_approved) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, false, false) \
         RETURNING {}",
        COURSE_COLUMNS
    ))
    .bind(payload.title.as_deref().unwrap_or_default().trim())
    .bind(validation::clean_rich_text(
        payload.description.as_deref().unwrap_or_default(),
    ))
    .bind(caller.id)
    .bind(payload.category.as_deref().unwrap_or_default())
    .bind(payload.level.as_deref().unwrap_or_default())
    .bind(payload.price.unwrap_or_default())
    .bind(validation::non_blank(payload.image.as_deref()))
    .bind(clean_list(payload.requirements.unwrap_or_default()))
    .bind(clean_list(payload.what_you_will_learn.unwrap_or_default()))
    .bind(normalize_tags(payload.tags.unwrap_or_default()))
    .fetch_one(pool.as_ref())
    .await?;

    tracing::info!(course_id = %course.id, instructor_id = %caller.id, "course created");

    Ok(ApiResponse::created("Course created successfully", course))
}

/// PUT /api/courses/{id}
pub async fn update_course(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(mut payload): Json<CourseRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = require_user(&headers).await?;
    let current = manageable_course(&caller, &id, "update").await?;
    validate_course(&payload, true)?;

    // Price and category are frozen for instructors once a course is approved.
    if current.is_approved && !caller.is_admin() {
        payload.price = None;
        payload.category = None;
    }

    let pool = db::require_pool()?;
    let course: Course = sqlx::query_as(&format!(
        "UPDATE courses SET title = $2, description = $3, category = $4, level = $5, price = $6, \
             image = $7, requirements = $8, what_you_will_learn = $9, tags = $10, \
             updated_at = now() \
         WHERE id = $1 RETURNING {}",
        COURSE_COLUMNS
    ))
    .bind(current.id)
    .bind(
        validation::non_blank(payload.title.as_deref()).unwrap_or(current.title),
    )
    .bind(
        payload
            .description
            .as_deref()
            .map(validation::clean_rich_text)
            .unwrap_or(current.description),
    )
    .bind(payload.category.unwrap_or(current.category))
    .bind(payload.level.unwrap_or(current.level))
    .bind(payload.price.unwrap_or(current.price))
    .bind(match payload.image {
        Some(image) => validation::non_blank(Some(image.as_str())),
        None => current.image,
    })
    .bind(payload.requirements.map(clean_list).unwrap_or(current.requirements))
    .bind(
        payload
            .what_you_will_learn
            .map(clean_list)
            .unwrap_or(current.what_you_will_learn),
    )
    .bind(payload.tags.map(normalize_tags).unwrap_or(current.tags))
    .fetch_one(pool.as_ref())
    .await?;

    Ok(ApiResponse::success_with_message(
        "Course updated successfully",
        course,
    ))
}

/// DELETE /api/courses/{id}
pub async fn delete_course(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let caller = require_user(&headers).await?;
    let course = manageable_course(&caller, &id, "delete").await?;
    let pool = db::require_pool()?;

    let (enrolled,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM enrollments WHERE course_id = $1")
            .bind(course.id)
            .fetch_one(pool.as_ref())
            .await?;
    if enrolled > 0 && !caller.is_admin() {
        return Err(ApiError::bad_request(
            "Cannot delete course with active enrollments",
        ));
    }

    sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(course.id)
        .execute(pool.as_ref())
        .await?;

    tracing::info!(course_id = %course.id, actor_id = %caller.id, enrolled, "course deleted");

    Ok(ApiResponse::acknowledge("Course deleted successfully"))
}

/// POST /api/courses/{id}/sections
pub async fn add_section(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<SectionRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = require_user(&headers).await?;
    let course = manageable_course(&caller, &id, "update").await?;
    validate_section(&payload)?;
    let pool = db::require_pool()?;

    let section: CourseSection = sqlx::query_as(
        "INSERT INTO course_sections (course_id, title, description, position) \
         VALUES ($1, $2, $3, COALESCE($4, \
             (SELECT COALESCE(MAX(position) + 1, 0) FROM course_sections WHERE course_id = $1))) \
         RETURNING id, course_id, title, description, position, created_at, updated_at",
    )
    .bind(course.id)
    .bind(payload.title.trim())
    .bind(validation::non_blank(payload.description.as_deref()))
    .bind(payload.order)
    .fetch_one(pool.as_ref())
    .await?;

    Ok(ApiResponse::created("Section added successfully", section))
}

/// DELETE /api/courses/{id}/sections/{section_id}
pub async fn delete_section(
    headers: HeaderMap,
    Path((id, section_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let caller = require_user(&headers).await?;
    let course = manageable_course(&caller, &id, "update").await?;
    let section_id = parse_id(&section_id, "sectionId")?;
    let pool = db::require_pool()?;

    let mut tx = pool.begin().await?;
    let deleted = sqlx::query("DELETE FROM course_sections WHERE id = $1 AND course_id = $2")
        .bind(section_id)
        .bind(course.id)
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::not_found("Section not found"));
    }
    recompute_total_duration(&mut *tx, course.id).await?;
    tx.commit().await?;

    Ok(ApiResponse::acknowledge("Section deleted successfully"))
}

/// POST /api/courses/{id}/sections/{section_id}/lessons
pub async fn add_lesson(
    headers: HeaderMap,
    Path((id, section_id)): Path<(String, String)>,
    Json(payload): Json<LessonRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = require_user(&headers).await?;
    let course = manageable_course(&caller, &id, "update").await?;
    let section_id = parse_id(&section_id, "sectionId")?;
    validate_lesson(&payload)?;
    let pool = db::require_pool()?;

    let mut tx = pool.begin().await?;
    let section: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM course_sections WHERE id = $1 AND course_id = $2")
            .bind(section_id)
            .bind(course.id)
            .fetch_optional(&mut *tx)
            .await?;
    if section.is_none() {
        return Err(ApiError::not_found("Section not found"));
    }

    let lesson: CourseLesson = sqlx::query_as(
        "INSERT INTO course_lessons \
             (section_id, course_id, title, description, video_url, duration, resources, \
              is_preview, position) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, \
             (SELECT COALESCE(MAX(position) + 1, 0) FROM course_lessons WHERE section_id = $1))) \
         RETURNING id, section_id, course_id, title, description, video_url, duration, resources, \
                   is_preview, position, created_at, updated_at",
    )
    .bind(section_id)
    .bind(course.id)
    .bind(payload.title.trim())
    .bind(validation::non_blank(payload.description.as_deref()))
    .bind(validation::non_blank(payload.video_url.as_deref()))
    .bind(payload.duration)
    .bind(SqlJson(payload.resources))
    .bind(payload.is_preview)
    .bind(payload.order)
    .fetch_one(&mut *tx)
    .await?;

    recompute_total_duration(&mut *tx, course.id).await?;
    tx.commit().await?;

    Ok(ApiResponse::created("Lesson added successfully", lesson))
}

/// DELETE /api/courses/{id}/sections/{section_id}/lessons/{lesson_id}
pub async fn delete_lesson(
    headers: HeaderMap,
    Path((id, section_id, lesson_id)): Path<(String, String, String)>,
) -> ApiResult<impl IntoResponse> {
    let caller = require_user(&headers).await?;
    let course = manageable_course(&caller, &id, "update").await?;
    let section_id = parse_id(&section_id, "sectionId")?;
    let lesson_id = parse_id(&lesson_id, "lessonId")?;
    let pool = db::require_pool()?;

    let mut tx = pool.begin().await?;
    let deleted = sqlx::query(
        "DELETE FROM course_lessons WHERE id = $1 AND section_id = $2 AND course_id = $3",
    )
    .bind(lesson_id)
    .bind(section_id)
    .bind(course.id)
    .execute(&mut *tx)
    .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::not_found("Lesson not found"));
    }
    recompute_total_duration(&mut *tx, course.id).await?;
    tx.commit().await?;

    Ok(ApiResponse::acknowledge("Lesson deleted successfully"))
}

/// POST /api/courses/{id}/review
pub async fn add_review(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<ReviewRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = require_user(&headers).await?;
    let course_id = parse_id(&id, "id")?;
    let rating = validate_review(&payload)?;
    let pool = db::require_pool()?;

    let course = fetch_course(pool.as_ref(), course_id).await?;
    if find_enrollment(pool.as_ref(), caller.id, course.id)
        .await?
        .is_none()
    {
        return Err(ApiError::bad_request(
            "You must be enrolled to review this course",
        ));
    }

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO course_reviews (course_id, student_id, rating, comment) VALUES ($1, $2, $3, $4)",
    )
    .bind(course.id)
    .bind(caller.id)
    .bind(rating)
    .bind(validation::non_blank(payload.comment.as_deref()))
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::bad_request("You have already reviewed this course")
        } else {
            ApiError::Database(e)
        }
    })?;

    let ratings: Vec<(i32,)> = sqlx::query_as("SELECT rating FROM course_reviews WHERE course_id = $1")
        .bind(course.id)
        .fetch_all(&mut *tx)
        .await?;
    let ratings: Vec<i32> = ratings.into_iter().map(|(r,)| r).collect();
    sqlx::query("UPDATE courses SET rating = $2, updated_at = now() WHERE id = $1")
        .bind(course.id)
        .bind(average_rating(&ratings))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::acknowledge("Review added successfully"),
    ))
}

/// GET /api/courses/teacher/my-courses
pub async fn teacher_courses(
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let caller = require_teacher(&headers).await?;
    let window = page_window(query.page, query.limit, 10)?;
    let pool = db::require_pool()?;

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM courses WHERE instructor_id = $1")
        .bind(caller.id)
        .fetch_one(pool.as_ref())
        .await?;

    let courses: Vec<Course> = sqlx::query_as(&format!(
        "SELECT {} FROM courses WHERE instructor_id = $1 \
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        COURSE_COLUMNS
    ))
    .bind(caller.id)
    .bind(window.limit)
    .bind(window.offset())
    .fetch_all(pool.as_ref())
    .await?;

    let ids: Vec<Uuid> = courses.iter().map(|c| c.id).collect();
    let students: Vec<StudentRef> = sqlx::query_as(
        "SELECT e.course_id, u.id, u.name, u.email \
         FROM enrollments e JOIN users u ON u.id = e.student_id \
         WHERE e.course_id = ANY($1) ORDER BY e.enrolled_at",
    )
    .bind(&ids)
    .fetch_all(pool.as_ref())
    .await?;

    let mut by_course: HashMap<Uuid, Vec<StudentRef>> = HashMap::new();
    for student in students {
        by_course.entry(student.course_id).or_default().push(student);
    }

    let courses = courses
        .into_iter()
        .map(|course| TeacherCourse {
            enrolled_students: by_course.remove(&course.id).unwrap_or_default(),
            course,
        })
        .collect();

    Ok(ApiResponse::success(TeacherCourseList {
        courses,
        pagination: window.pagination(total),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use chrono::Utc;
    use tower::ServiceExt;

    fn courses_router() -> Router {
        Router::new()
            .route("/api/courses", get(list_courses).post(create_course))
            .route("/api/courses/teacher/my-courses", get(teacher_courses))
            .route(
                "/api/courses/{id}",
                get(get_course).put(update_course).delete(delete_course),
            )
            .route("/api/courses/{id}/sections", post(add_section))
            .route("/api/courses/{id}/review", post(add_review))
    }

    fn long_description() -> String {
        "A practical course that walks through building web services in Rust.".to_string()
    }

    #[test]
    fn test_parse_price_range() {
        assert_eq!(parse_price_range("free"), Some((Some(0.0), Some(0.0))));
        assert_eq!(parse_price_range("10-50"), Some((Some(10.0), Some(50.0))));
        assert_eq!(parse_price_range("100+"), Some((Some(100.0), None)));
        assert_eq!(parse_price_range("50-10"), None);
        assert_eq!(parse_price_range("cheap"), None);
    }

    #[test]
    fn test_course_filters_defaults_to_newest() {
        let filters = course_filters(&CourseListQuery::default()).unwrap();
        assert_eq!(filters.sort, "newest");
        assert_eq!(sort_clause(filters.sort), "c.created_at DESC");
    }

    #[test]
    fn test_course_filters_combine_price_bounds() {
        let query = CourseListQuery {
            price_range: Some("10-100".to_string()),
            max_price: Some(40.0),
            search: Some("rust".to_string()),
            sort_by: Some("price-low".to_string()),
            ..Default::default()
        };
        let filters = course_filters(&query).unwrap();
        assert_eq!(filters.min_price, Some(10.0));
        assert_eq!(filters.max_price, Some(40.0));
        assert_eq!(filters.search.as_deref(), Some("%rust%"));
        assert_eq!(sort_clause(filters.sort), "c.price ASC, c.created_at DESC");
    }

    #[test]
    fn test_course_filters_reject_unknown_values() {
        let query = CourseListQuery {
            category: Some("Cooking".to_string()),
            rating: Some(7.0),
            sort_by: Some("random".to_string()),
            ..Default::default()
        };
        match course_filters(&query) {
            Err(ApiError::Validation(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["category", "rating", "sortBy"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_course_requires_fields_on_create() {
        match validate_course(&CourseRequest::default(), false) {
            Err(ApiError::Validation(errors)) => assert_eq!(errors.len(), 5),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(validate_course(&CourseRequest::default(), true).is_ok());
    }

    #[test]
    fn test_validate_course_accepts_complete_payload() {
        let payload = CourseRequest {
            title: Some("Rust for Web".to_string()),
            description: Some(long_description()),
            category: Some("Web Development".to_string()),
            level: Some("Beginner".to_string()),
            price: Some(49.99),
            requirements: Some(vec!["Basic programming".to_string()]),
            ..Default::default()
        };
        assert!(validate_course(&payload, false).is_ok());

        let too_expensive = CourseRequest {
            price: Some(10_000.0),
            ..payload
        };
        assert!(validate_course(&too_expensive, false).is_err());
    }

    #[test]
    fn test_normalize_tags() {
        let tags = vec![
            " Rust ".to_string(),
            "rust".to_string(),
            "Web".to_string(),
            "".to_string(),
        ];
        assert_eq!(normalize_tags(tags), vec!["rust", "web"]);
    }

    #[test]
    fn test_lesson_validation() {
        let payload = LessonRequest {
            title: "Intro".to_string(),
            video_url: Some("ftp://videos.example.com/intro.mp4".to_string()),
            duration: Some(0),
            ..Default::default()
        };
        match validate_lesson(&payload) {
            Err(ApiError::Validation(errors)) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["videoUrl", "duration"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_section_and_review_validation() {
        let section = SectionRequest {
            title: "Go".to_string(),
            order: Some(-1),
            ..Default::default()
        };
        assert!(validate_section(&section).is_err());

        assert!(validate_review(&ReviewRequest::default()).is_err());
        let review = ReviewRequest {
            rating: Some(5),
            comment: Some("Great".to_string()),
        };
        assert_eq!(validate_review(&review).unwrap(), 5);
    }

    #[test]
    fn test_nest_lessons_groups_by_section() {
        let now = Utc::now();
        let course_id = Uuid::new_v4();
        let section = |position| CourseSection {
            id: Uuid::new_v4(),
            course_id,
            title: format!("Section {}", position),
            description: None,
            position,
            created_at: now,
            updated_at: now,
        };
        let (first, second) = (section(0), section(1));
        let lesson = CourseLesson {
            id: Uuid::new_v4(),
            section_id: second.id,
            course_id,
            title: "Ownership".to_string(),
            description: None,
            video_url: None,
            duration: Some(12),
            resources: SqlJson(Vec::new()),
            is_preview: false,
            position: 0,
            created_at: now,
            updated_at: now,
        };

        let nested = nest_lessons(vec![first, second], vec![lesson]);
        assert!(nested[0].lessons.is_empty());
        assert_eq!(nested[1].lessons.len(), 1);
    }

    #[tokio::test]
    async fn test_list_rejects_bad_query_before_database() {
        let req = Request::builder()
            .uri("/api/courses?limit=500")
            .body(Body::empty())
            .unwrap();
        let res = courses_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_without_database_is_unavailable() {
        let req = Request::builder()
            .uri("/api/courses?category=Design")
            .body(Body::empty())
            .unwrap();
        let res = courses_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_authoring_routes_require_token() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/courses")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let res = courses_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/api/courses/teacher/my-courses")
            .body(Body::empty())
            .unwrap();
        let res = courses_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_course_rejects_malformed_id() {
        let req = Request::builder()
            .uri("/api/courses/not-a-uuid")
            .body(Body::empty())
            .unwrap();
        let res = courses_router().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
