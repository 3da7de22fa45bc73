//! Progress arithmetic shared by the enrollment and lesson-progress handlers.
//!
//! Everything here is pure: handlers load rows, call these functions and
//! write the result back.

use chrono::{DateTime, Utc};

use crate::db::models::{Bookmark, LessonProgress, Note, QuizAnswer, QuizAttempt};

/// Watch percentage at which a lesson counts as completed.
pub const COMPLETION_THRESHOLD: i32 = 90;

/// Seconds within which a second bookmark or note is treated as the same spot.
pub const TIMESTAMP_WINDOW_SECS: i32 = 5;

/// Percentage of lessons completed, rounded and clamped to 0..=100.
pub fn course_progress(completed_lessons: i64, total_lessons: i64) -> i32 {
    if total_lessons <= 0 {
        return 0;
    }
    let ratio = completed_lessons as f64 / total_lessons as f64;
    ((ratio * 100.0).round() as i32).clamp(0, 100)
}

/// Grow the watch time (never shrinks) and refresh the completion state.
///
/// Returns `true` when this call crossed the completion threshold.
pub fn apply_watch_time(progress: &mut LessonProgress, watch_time: i32, now: DateTime<Utc>) -> bool {
    progress.watch_time = progress.watch_time.max(watch_time.max(0));

    let total = progress.total_duration.max(1) as f64;
    let percentage = ((progress.watch_time as f64 / total) * 100.0).round() as i32;
    progress.completion_percentage = percentage.clamp(0, 100);
    progress.last_watched_at = now;

    if progress.completion_percentage >= COMPLETION_THRESHOLD && !progress.is_completed {
        progress.is_completed = true;
        progress.completed_at = Some(now);
        return true;
    }
    false
}

/// Append a bookmark unless one already sits within the timestamp window.
pub fn add_bookmark(
    progress: &mut LessonProgress,
    timestamp: i32,
    note: String,
    now: DateTime<Utc>,
) -> bool {
    let exists = progress
        .bookmarks
        .iter()
        .any(|b| (b.timestamp - timestamp).abs() < TIMESTAMP_WINDOW_SECS);
    if exists {
        return false;
    }
    progress.bookmarks.push(Bookmark {
        timestamp,
        note,
        created_at: now,
    });
    true
}

/// Replace the content of a nearby note, or append a new one.
pub fn upsert_note(progress: &mut LessonProgress, timestamp: i32, content: String, now: DateTime<Utc>) {
    if let Some(note) = progress
        .notes
        .iter_mut()
        .find(|n| (n.timestamp - timestamp).abs() < TIMESTAMP_WINDOW_SECS)
    {
        note.content = content;
        note.updated_at = now;
        return;
    }
    progress.notes.push(Note {
        timestamp,
        content,
        created_at: now,
        updated_at: now,
    });
}

pub fn record_quiz_attempt(
    progress: &mut LessonProgress,
    score: i32,
    answers: Vec<QuizAnswer>,
    now: DateTime<Utc>,
) {
    progress.quiz_attempts.push(QuizAttempt {
        attempted_at: now,
        score,
        answers,
    });
}

pub fn best_quiz_score(attempts: &[QuizAttempt]) -> Option<i32> {
    attempts.iter().map(|a| a.score).max()
}

/// Watch time in whole minutes.
pub fn study_minutes(watch_time_secs: i32) -> i64 {
    (watch_time_secs as f64 / 60.0).round() as i64
}

/// Completed over total as a percentage with two decimals.
pub fn completion_rate(completed: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round_to(completed as f64 / total as f64 * 100.0, 2)
}

pub fn average_rating(ratings: &[i32]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i64 = ratings.iter().map(|&r| r as i64).sum();
    round_to(sum as f64 / ratings.len() as f64, 1)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::types::Json;
    use uuid::Uuid;

    fn lesson(total_duration: i32) -> LessonProgress {
        let now = Utc::now();
        LessonProgress {
            id: Uuid::new_v4(),
            enrollment_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            section_id: Uuid::new_v4(),
            lesson_id: Uuid::new_v4(),
            watch_time: 0,
            total_duration,
            completion_percentage: 0,
            is_completed: false,
            completed_at: None,
            last_watched_at: now,
            bookmarks: Json(Vec::new()),
            notes: Json(Vec::new()),
            quiz_attempts: Json(Vec::new()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_course_progress_bounds() {
        assert_eq!(course_progress(0, 0), 0);
        assert_eq!(course_progress(1, 3), 33);
        assert_eq!(course_progress(2, 3), 67);
        assert_eq!(course_progress(3, 3), 100);
        assert_eq!(course_progress(5, 3), 100);
    }

    #[test]
    fn test_watch_time_only_grows() {
        let mut p = lesson(600);
        apply_watch_time(&mut p, 300, Utc::now());
        assert_eq!(p.watch_time, 300);
        assert_eq!(p.completion_percentage, 50);

        apply_watch_time(&mut p, 120, Utc::now());
        assert_eq!(p.watch_time, 300);
        assert_eq!(p.completion_percentage, 50);
    }

    #[test]
    fn test_watch_time_completes_once_at_threshold() {
        let mut p = lesson(100);
        assert!(!apply_watch_time(&mut p, 89, Utc::now()));
        assert!(apply_watch_time(&mut p, 90, Utc::now()));
        let completed_at = p.completed_at;
        assert!(!apply_watch_time(&mut p, 500, Utc::now()));
        assert_eq!(p.completion_percentage, 100);
        assert_eq!(p.completed_at, completed_at);
    }

    #[test]
    fn test_bookmarks_within_window_are_ignored() {
        let mut p = lesson(600);
        let now = Utc::now();
        assert!(add_bookmark(&mut p, 30, "intro".into(), now));
        assert!(!add_bookmark(&mut p, 34, "dup".into(), now));
        assert!(add_bookmark(&mut p, 35, "next".into(), now));
        assert_eq!(p.bookmarks.len(), 2);
    }

    #[test]
    fn test_notes_within_window_are_updated() {
        let mut p = lesson(600);
        let now = Utc::now();
        upsert_note(&mut p, 60, "first".into(), now);
        upsert_note(&mut p, 63, "edited".into(), now + Duration::seconds(10));
        upsert_note(&mut p, 120, "second".into(), now);

        assert_eq!(p.notes.len(), 2);
        assert_eq!(p.notes[0].content, "edited");
        assert!(p.notes[0].updated_at > p.notes[0].created_at);
    }

    #[test]
    fn test_best_quiz_score() {
        let mut p = lesson(600);
        assert_eq!(best_quiz_score(&p.quiz_attempts), None);
        record_quiz_attempt(&mut p, 70, Vec::new(), Utc::now());
        record_quiz_attempt(&mut p, 95, Vec::new(), Utc::now());
        record_quiz_attempt(&mut p, 80, Vec::new(), Utc::now());
        assert_eq!(best_quiz_score(&p.quiz_attempts), Some(95));
    }

    #[test]
    fn test_rates_and_rounding() {
        assert_eq!(study_minutes(89), 1);
        assert_eq!(study_minutes(29), 0);
        assert_eq!(completion_rate(1, 3), 33.33);
        assert_eq!(completion_rate(0, 0), 0.0);
        assert_eq!(average_rating(&[5, 4, 4]), 4.3);
        assert_eq!(average_rating(&[]), 0.0);
    }
}
