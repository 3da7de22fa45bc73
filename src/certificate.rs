//! Certificate issuance: identifiers, grading, the HTML document and the
//! database rows written when an enrollment reaches 100%.

use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::{types::Json, PgPool};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::CONFIG;
use crate::db::models::{
    Certificate, CertificateMetadata, Enrollment, Grade, QuizAttempt, CERTIFICATE_COLUMNS,
};
use crate::error::{ApiError, ApiResult};
use crate::progress::{best_quiz_score, round_to};

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Folder under the upload root holding generated documents.
pub const CERTIFICATE_FOLDER: &str = "certificates";

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

fn random_base36(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect()
}

/// `CERT-<base36 millis>-<6 random>`, upper-case.
pub fn generate_certificate_id(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().max(0) as u64;
    format!("CERT-{}-{}", to_base36(millis), random_base36(6))
}

pub fn generate_verification_code() -> String {
    random_base36(10)
}

pub fn grade_for(score: Option<f64>) -> Grade {
    match score {
        Some(s) if s >= 97.0 => Grade::APlus,
        Some(s) if s >= 90.0 => Grade::A,
        Some(s) if s >= 85.0 => Grade::BPlus,
        Some(s) if s >= 80.0 => Grade::B,
        Some(s) if s >= 75.0 => Grade::CPlus,
        Some(s) if s >= 70.0 => Grade::C,
        _ => Grade::Pass,
    }
}

/// Average of each lesson's best quiz score, or `None` without attempts.
pub fn final_score(lessons: &[Vec<QuizAttempt>]) -> Option<f64> {
    let best: Vec<i32> = lessons.iter().filter_map(|a| best_quiz_score(a)).collect();
    if best.is_empty() {
        return None;
    }
    let sum: i64 = best.iter().map(|&s| s as i64).sum();
    Some(round_to(sum as f64 / best.len() as f64, 2))
}

/// Whole days between enrollment and completion, rounded up, at least 1.
pub fn study_days(enrolled_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> i32 {
    let secs = (completed_at - enrolled_at).num_seconds().abs();
    let days = (secs + 86_399) / 86_400;
    days.max(1) as i32
}

pub fn format_date(date: DateTime<Utc>) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Human readable course length from a minute total.
pub fn format_duration(total_minutes: i32) -> String {
    let total = total_minutes.max(0);
    let (hours, minutes) = (total / 60, total % 60);
    let plural = |n: i32, unit: &str| {
        if n == 1 {
            format!("1 {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };
    match (hours, minutes) {
        (0, m) => plural(m, "minute"),
        (h, 0) => plural(h, "hour"),
        (h, m) => format!("{} {}", plural(h, "hour"), plural(m, "minute")),
    }
}

pub fn file_name(certificate_id: &str) -> String {
    format!("certificate-{}.html", certificate_id)
}

pub fn public_url(certificate_id: &str) -> String {
    format!("/uploads/{}/{}", CERTIFICATE_FOLDER, file_name(certificate_id))
}

/// Printable HTML document. Every interpolated value is escaped.
pub fn render_html(
    certificate_id: &str,
    grade: &str,
    completion_date: DateTime<Utc>,
    metadata: &CertificateMetadata,
) -> String {
    let esc = ammonia::clean_text;
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Certificate of Completion</title>
  <style>
    @page {{ size: A4 landscape; margin: 0; }}
    body {{ margin: 0; padding: 40px; font-family: Georgia, serif; background: #f6f9fc; }}
    .certificate {{ max-width: 800px; margin: 0 auto; background: #fff; border: 12px solid #667eea;
      border-radius: 20px; padding: 60px; text-align: center; position: relative; }}
    .logo {{ font-size: 2.5rem; font-weight: bold; color: #667eea; }}
    .title {{ font-size: 3rem; color: #2d3748; margin: 20px 0; }}
    .subtitle, .completion-text {{ font-size: 1.2rem; color: #718096; }}
    .recipient-name {{ font-size: 2.5rem; font-weight: bold; color: #2d3748;
      border-bottom: 3px solid #e2e8f0; display: inline-block; min-width: 400px; }}
    .course-title {{ font-size: 2rem; color: #667eea; margin: 30px 0; }}
    .details, .signatures {{ display: flex; justify-content: space-between; margin: 40px 0; }}
    .detail-item, .signature {{ flex: 1; }}
    .detail-label {{ font-weight: bold; display: block; margin-bottom: 5px; }}
    .signature-line {{ border-top: 2px solid #2d3748; width: 200px; margin: 0 auto 10px; }}
    .grade-badge {{ position: absolute; top: 30px; right: 30px; background: #38a169; color: #fff;
      padding: 10px 20px; border-radius: 25px; font-weight: bold; }}
    .certificate-id {{ position: absolute; bottom: 10px; right: 20px; font-size: 0.8rem; color: #a0aec0; }}
  </style>
</head>
<body>
  <div class="certificate">
    <div class="grade-badge">Grade: {grade}</div>
    <div class="header">
      <div class="logo">LearnHub</div>
      <h1 class="title">Certificate of Completion</h1>
      <p class="subtitle">This is to certify that</p>
    </div>
    <div class="recipient">
      <div class="recipient-name">{student}</div>
      <p class="completion-text">has successfully completed the course</p>
      <h2 class="course-title">{course}</h2>
    </div>
    <div class="details">
      <div class="detail-item"><span class="detail-label">Instructor</span>{instructor}</div>
      <div class="detail-item"><span class="detail-label">Duration</span>{duration}</div>
      <div class="detail-item"><span class="detail-label">Completion Date</span>{date}</div>
    </div>
    <div class="signatures">
      <div class="signature">
        <div class="signature-line"></div>
        <div class="signature-name">LearnHub</div>
        <div class="signature-title">Learning Platform</div>
      </div>
      <div class="signature">
        <div class="signature-line"></div>
        <div class="signature-name">{instructor}</div>
        <div class="signature-title">Course Instructor</div>
      </div>
    </div>
    <div class="certificate-id">Certificate ID: {id}</div>
  </div>
</body>
</html>
"#,
        grade = esc(grade),
        student = esc(&metadata.student_name),
        course = esc(&metadata.course_title),
        instructor = esc(&metadata.instructor_name),
        duration = esc(&metadata.course_duration),
        date = esc(&format_date(completion_date)),
        id = esc(certificate_id),
    )
}

/// Write the document under `<upload_dir>/certificates/`.
pub async fn write_document(upload_dir: &Path, certificate_id: &str, html: &str) -> std::io::Result<PathBuf> {
    let dir = upload_dir.join(CERTIFICATE_FOLDER);
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(file_name(certificate_id));
    tokio::fs::write(&path, html).await?;
    Ok(path)
}

#[derive(sqlx::FromRow)]
struct IssueContext {
    student_name: String,
    course_title: String,
    total_duration: i32,
    instructor_name: String,
}

/// Issue the certificate for a completed enrollment.
///
/// Returns `None` when one was already issued. The enrollment row is claimed
/// first, so concurrent completions produce a single certificate.
pub async fn issue_for_enrollment(
    pool: &PgPool,
    enrollment: &Enrollment,
) -> ApiResult<Option<Certificate>> {
    if enrollment.certificate_issued {
        return Ok(None);
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let claimed: Option<(Uuid,)> = sqlx::query_as(
        "UPDATE enrollments SET certificate_issued = true, certificate_issued_at = $2, \
         updated_at = now() WHERE id = $1 AND NOT certificate_issued RETURNING id",
    )
    .bind(enrollment.id)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;
    if claimed.is_none() {
        return Ok(None);
    }

    let context: IssueContext = sqlx::query_as(
        "SELECT s.name AS student_name, c.title AS course_title, c.total_duration, \
                i.name AS instructor_name \
         FROM courses c \
         JOIN users s ON s.id = $1 \
         JOIN users i ON i.id = c.instructor_id \
         WHERE c.id = $2",
    )
    .bind(enrollment.student_id)
    .bind(enrollment.course_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Course not found"))?;

    let attempts: Vec<(Json<Vec<QuizAttempt>>,)> =
        sqlx::query_as("SELECT quiz_attempts FROM lesson_progress WHERE enrollment_id = $1")
            .bind(enrollment.id)
            .fetch_all(&mut *tx)
            .await?;
    let attempts: Vec<Vec<QuizAttempt>> = attempts.into_iter().map(|(a,)| a.0).collect();

    let completion_date = enrollment.completed_at.unwrap_or(now);
    let score = final_score(&attempts);
    let grade = grade_for(score);
    let certificate_id = generate_certificate_id(now);
    let verification_code = generate_verification_code();

    let metadata = CertificateMetadata {
        instructor_name: context.instructor_name,
        course_title: context.course_title,
        course_duration: format_duration(context.total_duration),
        student_name: context.student_name,
        issue_date: format_date(now),
    };

    let inserted: Option<Certificate> = sqlx::query_as(&format!(
        "INSERT INTO certificates (student_id, course_id, enrollment_id, certificate_id, \
             verification_code, issued_at, completion_date, grade, final_score, study_duration, \
             certificate_url, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (enrollment_id) DO NOTHING \
         RETURNING {}",
        CERTIFICATE_COLUMNS
    ))
    .bind(enrollment.student_id)
    .bind(enrollment.course_id)
    .bind(enrollment.id)
    .bind(&certificate_id)
    .bind(&verification_code)
    .bind(now)
    .bind(completion_date)
    .bind(grade.as_str())
    .bind(score)
    .bind(study_days(enrollment.enrolled_at, completion_date))
    .bind(public_url(&certificate_id))
    .bind(Json(&metadata))
    .fetch_optional(&mut *tx)
    .await?;
    let Some(certificate) = inserted else {
        return Ok(None);
    };

    // Dropping the transaction on a write failure releases the claim.
    let html = render_html(&certificate_id, grade.as_str(), completion_date, &metadata);
    write_document(Path::new(&CONFIG.upload_dir), &certificate_id, &html)
        .await
        .map_err(|e| ApiError::internal(format!("Certificate generation failed: {}", e)))?;

    tx.commit().await?;

    tracing::info!(
        certificate_id = %certificate.certificate_id,
        enrollment_id = %enrollment.id,
        grade = %certificate.grade,
        "certificate issued"
    );

    Ok(Some(certificate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn attempt(score: i32) -> QuizAttempt {
        QuizAttempt {
            attempted_at: Utc::now(),
            score,
            answers: Vec::new(),
        }
    }

    fn metadata() -> CertificateMetadata {
        CertificateMetadata {
            instructor_name: "Grace Hopper".to_string(),
            course_title: "Compilers <101>".to_string(),
            course_duration: format_duration(150),
            student_name: "Ada Lovelace".to_string(),
            issue_date: "January 5, 2026".to_string(),
        }
    }

    #[test]
    fn test_certificate_id_format() {
        let id = generate_certificate_id(Utc::now());
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "CERT");
        assert_eq!(parts[2].len(), 6);
        assert!(id
            .chars()
            .all(|c| c == '-' || c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_verification_code_format() {
        let code = generate_verification_code();
        assert_eq!(code.len(), 10);
        assert!(code.bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn test_grade_thresholds() {
        assert_eq!(grade_for(Some(97.0)), Grade::APlus);
        assert_eq!(grade_for(Some(96.9)), Grade::A);
        assert_eq!(grade_for(Some(85.0)), Grade::BPlus);
        assert_eq!(grade_for(Some(80.0)), Grade::B);
        assert_eq!(grade_for(Some(75.0)), Grade::CPlus);
        assert_eq!(grade_for(Some(70.0)), Grade::C);
        assert_eq!(grade_for(Some(69.9)), Grade::Pass);
        assert_eq!(grade_for(None), Grade::Pass);
    }

    #[test]
    fn test_final_score_uses_best_attempt_per_lesson() {
        let lessons = vec![
            vec![attempt(60), attempt(100)],
            vec![attempt(80)],
            Vec::new(),
        ];
        assert_eq!(final_score(&lessons), Some(90.0));
        assert_eq!(final_score(&[Vec::new()]), None);
    }

    #[test]
    fn test_study_days_round_up_with_minimum() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(study_days(start, start), 1);
        assert_eq!(study_days(start, start + Duration::hours(3)), 1);
        assert_eq!(study_days(start, start + Duration::hours(25)), 2);
        assert_eq!(study_days(start, start + Duration::days(7)), 7);
    }

    #[test]
    fn test_format_helpers() {
        let date = Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap();
        assert_eq!(format_date(date), "March 9, 2026");
        assert_eq!(format_duration(45), "45 minutes");
        assert_eq!(format_duration(60), "1 hour");
        assert_eq!(format_duration(150), "2 hours 30 minutes");
        assert_eq!(public_url("CERT-A-B"), "/uploads/certificates/certificate-CERT-A-B.html");
    }

    #[test]
    fn test_render_html_escapes_values() {
        let html = render_html("CERT-1-ABCDEF", "A+", Utc::now(), &metadata());
        assert!(html.contains(&ammonia::clean_text("Ada Lovelace")));
        assert!(html.contains("&lt;101&gt;"));
        assert!(!html.contains("<101>"));
        assert!(html.contains("Grade: A+"));
        assert!(html.contains("Certificate ID: CERT-1-ABCDEF"));
    }

    fn completed_enrollment(certificate_issued: bool) -> Enrollment {
        let now = Utc::now();
        Enrollment {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            enrolled_at: now - Duration::days(3),
            completed_at: Some(now),
            progress: 100,
            last_accessed_at: now,
            current_section_id: None,
            current_lesson_id: None,
            certificate_issued,
            certificate_issued_at: certificate_issued.then_some(now),
            payment_status: "completed".to_string(),
            payment_id: None,
            amount_paid: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_issue_skips_enrollment_with_certificate() {
        // Never connects: the issued flag short-circuits before any query.
        let pool = PgPool::connect_lazy("postgres://learnhub@127.0.0.1:1/learnhub").unwrap();
        let issued = issue_for_enrollment(&pool, &completed_enrollment(true))
            .await
            .unwrap();
        assert!(issued.is_none());
    }

    #[tokio::test]
    async fn test_write_document_creates_folder() {
        let root = std::env::temp_dir().join(format!("learnhub-cert-{}", Uuid::new_v4()));
        let path = write_document(&root, "CERT-TEST", "<html></html>").await.unwrap();
        assert!(path.ends_with("certificates/certificate-CERT-TEST.html"));
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "<html></html>");
        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
