//! Database Models - structs representing database tables (used by sqlx/serde),
//! plus the enumerations stored as TEXT columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use std::{fmt, str::FromStr};
use uuid::Uuid;

// ============================================================================
// Enumerations
// ============================================================================

/// Error returned when a TEXT column or request field holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value '{0}'")]
pub struct UnknownVariant(pub String);

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }
    };
}

text_enum!(
    /// User role
    Role {
        Student => "student",
        Teacher => "teacher",
        Admin => "admin",
    }
);

text_enum!(
    /// Course category
    Category {
        WebDevelopment => "Web Development",
        MobileDevelopment => "Mobile Development",
        DataScience => "Data Science",
        MachineLearning => "Machine Learning",
        Design => "Design",
        Business => "Business",
        Marketing => "Marketing",
        Photography => "Photography",
    }
);

text_enum!(
    /// Course difficulty level
    Level {
        Beginner => "Beginner",
        Intermediate => "Intermediate",
        Advanced => "Advanced",
    }
);

text_enum!(
    /// Enrollment payment status
    PaymentStatus {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
        Refunded => "refunded",
    }
);

text_enum!(
    /// Certificate grade
    Grade {
        APlus => "A+",
        A => "A",
        BPlus => "B+",
        B => "B",
        CPlus => "C+",
        C => "C",
        Pass => "Pass",
    }
);

text_enum!(
    /// Lesson resource kind
    ResourceKind {
        Pdf => "pdf",
        Doc => "doc",
        Link => "link",
        Image => "image",
        Video => "video",
    }
);

// ============================================================================
// Users
// ============================================================================

/// User model
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Stored role, defaulting to student if the column was edited by hand.
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or(Role::Student)
    }
}

pub const USER_COLUMNS: &str = "id, name, email, password_hash, role, avatar, bio, website, \
     location, is_active, is_verified, last_login_at, created_at, updated_at";

// ============================================================================
// Courses
// ============================================================================

/// Course model
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub instructor_id: Uuid,
    pub category: String,
    pub level: String,
    pub price: f64,
    pub image: Option<String>,
    pub requirements: Vec<String>,
    pub what_you_will_learn: Vec<String>,
    pub tags: Vec<String>,
    pub rating: f64,
    pub total_duration: i32,
    pub is_published: bool,
    pub is_approved: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn is_available(&self) -> bool {
        self.is_published && self.is_approved
    }
}

pub const COURSE_COLUMNS: &str = "id, title, description, instructor_id, category, level, price, \
     image, requirements, what_you_will_learn, tags, rating, total_duration, is_published, \
     is_approved, published_at, approved_at, approved_by, rejection_reason, created_at, updated_at";

/// Course section
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSection {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Attachment listed under a lesson
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonResource {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
}

/// Course lesson
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseLesson {
    pub id: Uuid,
    pub section_id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<i32>,
    pub resources: Json<Vec<LessonResource>>,
    pub is_preview: bool,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Course review
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseReview {
    pub id: Uuid,
    pub course_id: Uuid,
    pub student_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Course summary joined onto enrollment and certificate listings.
///
/// Columns are aliased so the row can sit beside another table's columns.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseBrief {
    #[sqlx(rename = "course_ref")]
    pub id: Uuid,
    #[sqlx(rename = "course_title")]
    pub title: String,
    #[sqlx(rename = "course_image")]
    pub image: Option<String>,
    #[sqlx(rename = "course_category")]
    pub category: String,
    #[sqlx(rename = "course_level")]
    pub level: String,
    #[sqlx(rename = "course_price")]
    pub price: f64,
    #[sqlx(rename = "course_rating")]
    pub rating: f64,
    pub instructor_id: Uuid,
    pub instructor_name: String,
}

/// Select list for [`CourseBrief`] over `courses c JOIN users i`.
pub const COURSE_BRIEF_SELECT: &str = "c.id AS course_ref, c.title AS course_title, \
     c.image AS course_image, c.category AS course_category, c.level AS course_level, \
     c.price AS course_price, c.rating AS course_rating, c.instructor_id, \
     i.name AS instructor_name";

// ============================================================================
// Enrollments
// ============================================================================

/// Enrollment model
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: i32,
    pub last_accessed_at: DateTime<Utc>,
    pub current_section_id: Option<Uuid>,
    pub current_lesson_id: Option<Uuid>,
    pub certificate_issued: bool,
    pub certificate_issued_at: Option<DateTime<Utc>>,
    pub payment_status: String,
    pub payment_id: Option<String>,
    pub amount_paid: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn is_completed(&self) -> bool {
        self.progress == 100 && self.completed_at.is_some()
    }
}

pub const ENROLLMENT_COLUMNS: &str = "id, student_id, course_id, enrolled_at, completed_at, \
     progress, last_accessed_at, current_section_id, current_lesson_id, certificate_issued, \
     certificate_issued_at, payment_status, payment_id, amount_paid, created_at, updated_at";

// ============================================================================
// Certificates
// ============================================================================

/// Snapshot of names and dates printed on a certificate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateMetadata {
    pub instructor_name: String,
    pub course_title: String,
    pub course_duration: String,
    pub student_name: String,
    pub issue_date: String,
}

/// Certificate model
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub enrollment_id: Uuid,
    pub certificate_id: String,
    pub verification_code: String,
    pub issued_at: DateTime<Utc>,
    pub completion_date: DateTime<Utc>,
    pub grade: String,
    pub final_score: Option<f64>,
    pub study_duration: i32,
    pub certificate_url: Option<String>,
    pub is_verified: bool,
    pub metadata: Json<CertificateMetadata>,
    pub download_count: i32,
    pub last_downloaded_at: Option<DateTime<Utc>>,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<Uuid>,
    pub revoke_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    /// Verified and not revoked.
    pub fn is_valid(&self) -> bool {
        self.is_verified && !self.is_revoked
    }
}

pub const CERTIFICATE_COLUMNS: &str = "id, student_id, course_id, enrollment_id, certificate_id, \
     verification_code, issued_at, completion_date, grade, final_score, study_duration, \
     certificate_url, is_verified, metadata, download_count, last_downloaded_at, is_revoked, \
     revoked_at, revoked_by, revoke_reason, created_at, updated_at";

// ============================================================================
// Lesson progress
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub timestamp: i32,
    #[serde(default)]
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub timestamp: i32,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAnswer {
    pub question_id: String,
    pub selected_answer: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub attempted_at: DateTime<Utc>,
    pub score: i32,
    #[serde(default)]
    pub answers: Vec<QuizAnswer>,
}

/// Per-lesson watch state, bookmarks, notes and quiz attempts
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub section_id: Uuid,
    pub lesson_id: Uuid,
    pub watch_time: i32,
    pub total_duration: i32,
    pub completion_percentage: i32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_watched_at: DateTime<Utc>,
    pub bookmarks: Json<Vec<Bookmark>>,
    pub notes: Json<Vec<Note>>,
    pub quiz_attempts: Json<Vec<QuizAttempt>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const LESSON_PROGRESS_COLUMNS: &str = "id, enrollment_id, student_id, course_id, section_id, \
     lesson_id, watch_time, total_duration, completion_percentage, is_completed, completed_at, \
     last_watched_at, bookmarks, notes, quiz_attempts, created_at, updated_at";
