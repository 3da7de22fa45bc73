/**
 * Learning Routes
 * Enrollment, course progress and per-lesson watch state
 */
use axum::{
    extract::Path,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::certificate;
use crate::db::{
    self,
    models::{
        CourseLesson, Enrollment, LessonProgress, PaymentStatus, QuizAnswer, ENROLLMENT_COLUMNS,
        LESSON_PROGRESS_COLUMNS,
    },
};
use crate::error::{is_unique_violation, ApiError, ApiResult};
use crate::progress::{self, best_quiz_score, course_progress, study_minutes};
use crate::routes::courses::{fetch_course, find_enrollment};
use crate::routes::guard::{require_user, AuthUser};
use crate::routes::{parse_id, ApiResponse};
use crate::validation::Validator;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    #[serde(default)]
    pub section_id: String,
    #[serde(default)]
    pub lesson_id: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest {
    pub watch_time: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookmarkRequest {
    pub timestamp: Option<i32>,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NoteRequest {
    pub timestamp: Option<i32>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuizAttemptRequest {
    pub score: Option<i32>,
    #[serde(default)]
    pub answers: Vec<QuizAnswer>,
}

/// Lesson progress plus the derived figures shown in the player.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgressView {
    #[serde(flatten)]
    pub progress: LessonProgress,
    pub best_quiz_score: Option<i32>,
    pub study_time_minutes: i64,
}

impl From<LessonProgress> for LessonProgressView {
    fn from(progress: LessonProgress) -> Self {
        Self {
            best_quiz_score: best_quiz_score(&progress.quiz_attempts),
            study_time_minutes: study_minutes(progress.watch_time),
            progress,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchResult {
    #[serde(flatten)]
    pub lesson: LessonProgressView,
    /// Enrollment progress after this update.
    pub course_progress: i32,
}

// ============================================================================
// Validation
// ============================================================================

fn parse_body_id(raw: &str, field: &str, label: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::invalid(field, format!("Invalid {} ID format", label)))
}

fn validate_timestamp(v: &mut Validator, timestamp: Option<i32>) -> i32 {
    let timestamp = timestamp.unwrap_or(-1);
    v.check(timestamp >= 0, "timestamp", "Timestamp must be non-negative");
    timestamp
}

fn validate_watch(payload: &WatchRequest) -> ApiResult<i32> {
    let mut v = Validator::new();
    let watch_time = payload.watch_time.unwrap_or(-1);
    v.check(watch_time >= 0, "watchTime", "Watch time must be non-negative");
    v.finish()?;
    Ok(watch_time)
}

fn validate_bookmark(payload: &BookmarkRequest) -> ApiResult<i32> {
    let mut v = Validator::new();
    let timestamp = validate_timestamp(&mut v, payload.timestamp);
    v.max_length(
        "note",
        &payload.note,
        500,
        "Bookmark note cannot exceed 500 characters",
    );
    v.finish()?;
    Ok(timestamp)
}

fn validate_note(payload: &NoteRequest) -> ApiResult<i32> {
    let mut v = Validator::new();
    let timestamp = validate_timestamp(&mut v, payload.timestamp);
    v.length(
        "content",
        &payload.content,
        1,
        1000,
        "Note content must be between 1 and 1000 characters",
    );
    v.finish()?;
    Ok(timestamp)
}

fn validate_quiz(payload: &QuizAttemptRequest) -> ApiResult<i32> {
    let mut v = Validator::new();
    let score = payload.score.unwrap_or(-1);
    v.check(
        (0..=100).contains(&score),
        "score",
        "Score must be between 0 and 100",
    );
    v.finish()?;
    Ok(score)
}

/// Lesson length in seconds; at least one so percentages stay defined.
pub fn lesson_seconds(duration_minutes: Option<i32>) -> i32 {
    duration_minutes.unwrap_or(0).saturating_mul(60).max(1)
}

// ============================================================================
// Shared queries
// ============================================================================

async fn lesson_in_course<'e, E: PgExecutor<'e>>(
    executor: E,
    course_id: Uuid,
    lesson_id: Uuid,
) -> ApiResult<CourseLesson> {
    let lesson: Option<CourseLesson> = sqlx::query_as(
        "SELECT id, section_id, course_id, title, description, video_url, duration, resources, \
                is_preview, position, created_at, updated_at \
         FROM course_lessons WHERE id = $1 AND course_id = $2",
    )
    .bind(lesson_id)
    .bind(course_id)
    .fetch_optional(executor)
    .await?;
    lesson.ok_or_else(|| ApiError::not_found("Lesson not found"))
}

async fn require_enrollment(pool: &PgPool, student_id: Uuid, course_id: Uuid) -> ApiResult<Enrollment> {
    find_enrollment(pool, student_id, course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Enrollment not found"))
}

/// Record a completed lesson once and move the current position to it.
async fn record_completed_lesson(
    tx: &mut Transaction<'_, Postgres>,
    enrollment_id: Uuid,
    section_id: Uuid,
    lesson_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO enrollment_completed_lessons (enrollment_id, section_id, lesson_id) \
         VALUES ($1, $2, $3) ON CONFLICT (enrollment_id, lesson_id) DO NOTHING",
    )
    .bind(enrollment_id)
    .bind(section_id)
    .bind(lesson_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "UPDATE enrollments SET current_section_id = $2, current_lesson_id = $3, \
         last_accessed_at = now() WHERE id = $1",
    )
    .bind(enrollment_id)
    .bind(section_id)
    .bind(lesson_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Recompute the enrollment percentage from lessons that still exist.
async fn refresh_enrollment_progress(
    tx: &mut Transaction<'_, Postgres>,
    enrollment_id: Uuid,
    course_id: Uuid,
) -> Result<Enrollment, sqlx::Error> {
    let (completed, total): (i64, i64) = sqlx::query_as(
        "SELECT \
             (SELECT COUNT(*) FROM enrollment_completed_lessons ecl \
              JOIN course_lessons l ON l.id = ecl.lesson_id \
              WHERE ecl.enrollment_id = $1), \
             (SELECT COUNT(*) FROM course_lessons WHERE course_id = $2)",
    )
    .bind(enrollment_id)
    .bind(course_id)
    .fetch_one(&mut **tx)
    .await?;

    let percentage = course_progress(completed, total);
    sqlx::query_as(&format!(
        "UPDATE enrollments SET progress = $2, \
             completed_at = CASE WHEN $2 = 100 THEN COALESCE(completed_at, now()) \
                                 ELSE completed_at END, \
             last_accessed_at = now(), updated_at = now() \
         WHERE id = $1 RETURNING {}",
        ENROLLMENT_COLUMNS
    ))
    .bind(enrollment_id)
    .bind(percentage)
    .fetch_one(&mut **tx)
    .await
}

/// Issue the certificate once an enrollment reaches 100%.
///
/// Progress is already committed, so a failure here is logged and the
/// request still succeeds.
async fn issue_if_complete(pool: &PgPool, enrollment: &mut Enrollment) {
    if enrollment.progress < 100 || enrollment.certificate_issued {
        return;
    }
    match certificate::issue_for_enrollment(pool, enrollment).await {
        Ok(Some(issued)) => {
            enrollment.certificate_issued = true;
            enrollment.certificate_issued_at = Some(issued.issued_at);
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(enrollment_id = %enrollment.id, error = %e, "certificate issuance failed");
        }
    }
}

/// Progress row for a lesson, created at zero on first access.
async fn load_lesson_progress(
    pool: &PgPool,
    enrollment: &Enrollment,
    lesson: &CourseLesson,
) -> ApiResult<LessonProgress> {
    let progress = sqlx::query_as(&format!(
        "INSERT INTO lesson_progress \
             (enrollment_id, student_id, course_id, section_id, lesson_id, total_duration) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (student_id, course_id, lesson_id) \
             DO UPDATE SET section_id = EXCLUDED.section_id \
         RETURNING {}",
        LESSON_PROGRESS_COLUMNS
    ))
    .bind(enrollment.id)
    .bind(enrollment.student_id)
    .bind(enrollment.course_id)
    .bind(lesson.section_id)
    .bind(lesson.id)
    .bind(lesson_seconds(lesson.duration))
    .fetch_one(pool)
    .await?;
    Ok(progress)
}

async fn save_lesson_progress<'e, E: PgExecutor<'e>>(
    executor: E,
    progress: &LessonProgress,
) -> Result<LessonProgress, sqlx::Error> {
    sqlx::query_as(&format!(
        "UPDATE lesson_progress SET watch_time = $2, completion_percentage = $3, \
             is_completed = $4, completed_at = $5, last_watched_at = $6, bookmarks = $7, \
             notes = $8, quiz_attempts = $9, updated_at = now() \
         WHERE id = $1 RETURNING {}",
        LESSON_PROGRESS_COLUMNS
    ))
    .bind(progress.id)
    .bind(progress.watch_time)
    .bind(progress.completion_percentage)
    .bind(progress.is_completed)
    .bind(progress.completed_at)
    .bind(progress.last_watched_at)
    .bind(&progress.bookmarks)
    .bind(&progress.notes)
    .bind(&progress.quiz_attempts)
    .fetch_one(executor)
    .await
}

/// Caller, enrollment and lesson for the `/lessons/{lesson_id}` routes.
async fn lesson_context(
    headers: &HeaderMap,
    course_id: &str,
    lesson_id: &str,
) -> ApiResult<(AuthUser, Enrollment, CourseLesson)> {
    let caller = require_user(headers).await?;
    let course_id = parse_id(course_id, "id")?;
    let lesson_id = parse_id(lesson_id, "lessonId")?;
    let pool = db::require_pool()?;

    let enrollment = require_enrollment(pool.as_ref(), caller.id, course_id).await?;
    let lesson = lesson_in_course(pool.as_ref(), course_id, lesson_id).await?;
    Ok((caller, enrollment, lesson))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/courses/{id}/enroll
pub async fn enroll(headers: HeaderMap, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let caller = require_user(&headers).await?;
    let course_id = parse_id(&id, "id")?;
    let pool = db::require_pool()?;

    let course = fetch_course(pool.as_ref(), course_id).await?;
    if !course.is_available() {
        return Err(ApiError::bad_request(
            "Course is not available for enrollment",
        ));
    }

    let payment_status = if course.price == 0.0 {
        PaymentStatus::Completed
    } else {
        PaymentStatus::Pending
    };

    let mut tx = pool.begin().await?;
    let enrollment: Enrollment = sqlx::query_as(&format!(
        "INSERT INTO enrollments (student_id, course_id, payment_status, amount_paid) \
         VALUES ($1, $2, $3, $4) RETURNING {}",
        ENROLLMENT_COLUMNS
    ))
    .bind(caller.id)
    .bind(course.id)
    .bind(payment_status.as_str())
    .bind(course.price)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::bad_request("Already enrolled in this course")
        } else {
            ApiError::Database(e)
        }
    })?;

    sqlx::query("UPDATE courses SET updated_at = now() WHERE id = $1")
        .bind(course.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(
        student_id = %caller.id,
        course_id = %course.id,
        payment_status = %payment_status,
        "student enrolled"
    );

    Ok(ApiResponse::created(
        "Successfully enrolled in course",
        enrollment,
    ))
}

/// PUT /api/courses/{id}/progress
pub async fn update_progress(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<ProgressRequest>,
) -> ApiResult<impl IntoResponse> {
    let caller = require_user(&headers).await?;
    let course_id = parse_id(&id, "id")?;
    let section_id = parse_body_id(&payload.section_id, "sectionId", "section")?;
    let lesson_id = parse_body_id(&payload.lesson_id, "lessonId", "lesson")?;
    let pool = db::require_pool()?;

    let enrollment = require_enrollment(pool.as_ref(), caller.id, course_id).await?;
    let lesson = lesson_in_course(pool.as_ref(), course_id, lesson_id).await?;
    if lesson.section_id != section_id {
        return Err(ApiError::not_found("Lesson not found"));
    }

    let mut tx = pool.begin().await?;
    if payload.completed {
        record_completed_lesson(&mut tx, enrollment.id, section_id, lesson_id).await?;
    }
    let mut enrollment = refresh_enrollment_progress(&mut tx, enrollment.id, course_id).await?;
    tx.commit().await?;

    issue_if_complete(pool.as_ref(), &mut enrollment).await;

    Ok(ApiResponse::success(enrollment))
}

/// GET /api/courses/{id}/lessons/{lesson_id}/progress
pub async fn get_lesson_progress(
    headers: HeaderMap,
    Path((id, lesson_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let (_, enrollment, lesson) = lesson_context(&headers, &id, &lesson_id).await?;
    let pool = db::require_pool()?;
    let progress = load_lesson_progress(pool.as_ref(), &enrollment, &lesson).await?;
    Ok(ApiResponse::success(LessonProgressView::from(progress)))
}

/// PUT /api/courses/{id}/lessons/{lesson_id}/watch
pub async fn update_watch_time(
    headers: HeaderMap,
    Path((id, lesson_id)): Path<(String, String)>,
    Json(payload): Json<WatchRequest>,
) -> ApiResult<impl IntoResponse> {
    let watch_time = validate_watch(&payload)?;
    let (caller, enrollment, lesson) = lesson_context(&headers, &id, &lesson_id).await?;
    let pool = db::require_pool()?;

    let mut progress = load_lesson_progress(pool.as_ref(), &enrollment, &lesson).await?;
    let newly_completed = progress::apply_watch_time(&mut progress, watch_time, Utc::now());

    let mut tx = pool.begin().await?;
    let progress = save_lesson_progress(&mut *tx, &progress).await?;
    let mut enrollment = if newly_completed {
        record_completed_lesson(&mut tx, enrollment.id, lesson.section_id, lesson.id).await?;
        refresh_enrollment_progress(&mut tx, enrollment.id, enrollment.course_id).await?
    } else {
        enrollment
    };
    tx.commit().await?;

    if newly_completed {
        tracing::debug!(student_id = %caller.id, lesson_id = %lesson.id, "lesson completed by watch time");
        issue_if_complete(pool.as_ref(), &mut enrollment).await;
    }

    Ok(ApiResponse::success(WatchResult {
        lesson: progress.into(),
        course_progress: enrollment.progress,
    }))
}

/// POST /api/courses/{id}/lessons/{lesson_id}/bookmarks
pub async fn add_bookmark(
    headers: HeaderMap,
    Path((id, lesson_id)): Path<(String, String)>,
    Json(payload): Json<BookmarkRequest>,
) -> ApiResult<impl IntoResponse> {
    let timestamp = validate_bookmark(&payload)?;
    let (_, enrollment, lesson) = lesson_context(&headers, &id, &lesson_id).await?;
    let pool = db::require_pool()?;

    let mut progress = load_lesson_progress(pool.as_ref(), &enrollment, &lesson).await?;
    let added = progress::add_bookmark(
        &mut progress,
        timestamp,
        payload.note.trim().to_string(),
        Utc::now(),
    );
    let progress = if added {
        save_lesson_progress(pool.as_ref(), &progress).await?
    } else {
        progress
    };

    let message = if added {
        "Bookmark added successfully"
    } else {
        "Bookmark already exists near this timestamp"
    };
    Ok(ApiResponse::success_with_message(
        message,
        LessonProgressView::from(progress),
    ))
}

/// POST /api/courses/{id}/lessons/{lesson_id}/notes
pub async fn add_note(
    headers: HeaderMap,
    Path((id, lesson_id)): Path<(String, String)>,
    Json(payload): Json<NoteRequest>,
) -> ApiResult<impl IntoResponse> {
    let timestamp = validate_note(&payload)?;
    let (_, enrollment, lesson) = lesson_context(&headers, &id, &lesson_id).await?;
    let pool = db::require_pool()?;

    let mut progress = load_lesson_progress(pool.as_ref(), &enrollment, &lesson).await?;
    progress::upsert_note(
        &mut progress,
        timestamp,
        payload.content.trim().to_string(),
        Utc::now(),
    );
    let progress = save_lesson_progress(pool.as_ref(), &progress).await?;

    Ok(ApiResponse::success_with_message(
        "Note saved successfully",
        LessonProgressView::from(progress),
    ))
}

/// POST /api/courses/{id}/lessons/{lesson_id}/quiz-attempts
pub async fn add_quiz_attempt(
    headers: HeaderMap,
    Path((id, lesson_id)): Path<(String, String)>,
    Json(payload): Json<QuizAttemptRequest>,
) -> ApiResult<impl IntoResponse> {
    let score = validate_quiz(&payload)?;
    let (caller, enrollment, lesson) = lesson_context(&headers, &id, &lesson_id).await?;
    let pool = db::require_pool()?;

    let mut progress = load_lesson_progress(pool.as_ref(), &enrollment, &lesson).await?;
    progress::record_quiz_attempt(&mut progress, score, payload.answers, Utc::now());
    let progress = save_lesson_progress(pool.as_ref(), &progress).await?;

    tracing::debug!(student_id = %caller.id, lesson_id = %lesson.id, score, "quiz attempt recorded");

    Ok(ApiResponse::success_with_message(
        "Quiz attempt recorded",
        LessonProgressView::from(progress),
    ))
}
