/**
 * Certificate Routes
 * Public verification, owner downloads and admin revocation
 */
use axum::{
    extract::Path,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::certificate;
use crate::db::{
    self,
    models::{CERTIFICATE_COLUMNS, COURSE_BRIEF_SELECT},
};
use crate::error::{ApiError, ApiResult};
use crate::routes::guard::{ensure_owner_or_admin, require_admin, require_user};
use crate::routes::users::UserCertificate;
use crate::routes::ApiResponse;
use crate::validation::{self, Validator};

#[derive(Debug, Default, Deserialize)]
pub struct RevokeRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Verification {
    pub valid: bool,
    pub certificate: UserCertificate,
}

/// How a path segment identifies a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CertificateKey {
    Row(Uuid),
    Public(String),
}

impl CertificateKey {
    /// Row ids are UUIDs; anything else is treated as a `CERT-...` identifier.
    fn parse(raw: &str) -> Self {
        match Uuid::parse_str(raw.trim()) {
            Ok(id) => Self::Row(id),
            Err(_) => Self::Public(raw.trim().to_uppercase()),
        }
    }
}

fn certificate_select() -> String {
    format!(
        "SELECT {}, {} \
         FROM certificates ct \
         JOIN courses c ON c.id = ct.course_id \
         JOIN users i ON i.id = c.instructor_id",
        db::qualify(CERTIFICATE_COLUMNS, "ct"),
        COURSE_BRIEF_SELECT
    )
}

async fn find_certificate(key: &CertificateKey) -> ApiResult<UserCertificate> {
    let pool = db::require_pool()?;
    let found: Option<UserCertificate> = match key {
        CertificateKey::Row(id) => {
            sqlx::query_as(&format!("{} WHERE ct.id = $1", certificate_select()))
                .bind(id)
                .fetch_optional(pool.as_ref())
                .await?
        }
        CertificateKey::Public(certificate_id) => {
            sqlx::query_as(&format!(
                "{} WHERE ct.certificate_id = $1",
                certificate_select()
            ))
            .bind(certificate_id)
            .fetch_optional(pool.as_ref())
            .await?
        }
    };
    found.ok_or_else(|| ApiError::not_found("Certificate not found"))
}

async fn owned_certificate(headers: &HeaderMap, raw_id: &str) -> ApiResult<UserCertificate> {
    let caller = require_user(headers).await?;
    let found = find_certificate(&CertificateKey::parse(raw_id)).await?;
    ensure_owner_or_admin(
        &caller,
        found.certificate.student_id,
        "Access denied. You can only access your own certificates",
    )?;
    Ok(found)
}

fn validate_revoke(payload: &RevokeRequest) -> ApiResult<()> {
    let mut v = Validator::new();
    v.optional_max_length(
        "reason",
        payload.reason.as_deref(),
        500,
        "Revoke reason cannot exceed 500 characters",
    );
    v.finish()
}

/// GET /api/certificates/verify/{certificate_id}/{code}
pub async fn verify_certificate(
    Path((certificate_id, code)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let pool = db::require_pool()?;

    let found: Option<UserCertificate> = sqlx::query_as(&format!(
        "{} WHERE upper(ct.certificate_id) = upper($1) \
           AND upper(ct.verification_code) = upper($2)",
        certificate_select()
    ))
    .bind(certificate_id.trim())
    .bind(code.trim())
    .fetch_optional(pool.as_ref())
    .await?;

    let certificate = found
        .filter(|found| found.certificate.is_valid())
        .ok_or_else(|| ApiError::not_found("Certificate not found or invalid"))?;

    Ok(ApiResponse::success_with_message(
        "Certificate is valid",
        Verification {
            valid: true,
            certificate,
        },
    ))
}

/// GET /api/certificates/{id}
pub async fn get_certificate(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(ApiResponse::success(owned_certificate(&headers, &id).await?))
}

/// GET /api/certificates/{id}/download
/// Renders the HTML document and counts the download.
pub async fn download_certificate(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let found = owned_certificate(&headers, &id).await?;
    let cert = found.certificate;
    if cert.is_revoked {
        return Err(ApiError::bad_request("Certificate has been revoked"));
    }

    let pool = db::require_pool()?;
    sqlx::query(
        "UPDATE certificates SET download_count = download_count + 1, \
         last_downloaded_at = now(), updated_at = now() WHERE id = $1",
    )
    .bind(cert.id)
    .execute(pool.as_ref())
    .await?;

    let html = certificate::render_html(
        &cert.certificate_id,
        &cert.grade,
        cert.completion_date,
        &cert.metadata,
    );
    let disposition = format!(
        "attachment; filename=\"{}\"",
        certificate::file_name(&cert.certificate_id)
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        html,
    ))
}

/// PUT /api/certificates/{id}/revoke
pub async fn revoke_certificate(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<RevokeRequest>,
) -> ApiResult<impl IntoResponse> {
    let admin = require_admin(&headers).await?;
    validate_revoke(&payload)?;
    let found = find_certificate(&CertificateKey::parse(&id)).await?;
    if found.certificate.is_revoked {
        return Err(ApiError::bad_request("Certificate is already revoked"));
    }

    let pool = db::require_pool()?;
    sqlx::query(
        "UPDATE certificates SET is_revoked = true, revoked_at = now(), revoked_by = $2, \
         revoke_reason = $3, updated_at = now() WHERE id = $1",
    )
    .bind(found.certificate.id)
    .bind(admin.id)
    .bind(validation::non_blank(payload.reason.as_deref()))
    .execute(pool.as_ref())
    .await?;

    tracing::warn!(
        certificate_id = %found.certificate.certificate_id,
        admin_id = %admin.id,
        "certificate revoked"
    );

    Ok(ApiResponse::acknowledge("Certificate revoked successfully"))
}

/// PUT /api/certificates/{id}/restore
pub async fn restore_certificate(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let admin = require_admin(&headers).await?;
    let found = find_certificate(&CertificateKey::parse(&id)).await?;
    if !found.certificate.is_revoked {
        return Err(ApiError::bad_request("Certificate is not revoked"));
    }

    let pool = db::require_pool()?;
    sqlx::query(
        "UPDATE certificates SET is_revoked = false, revoked_at = NULL, revoked_by = NULL, \
         revoke_reason = NULL, updated_at = now() WHERE id = $1",
    )
    .bind(found.certificate.id)
    .execute(pool.as_ref())
    .await?;

    tracing::info!(
        certificate_id = %found.certificate.certificate_id,
        admin_id = %admin.id,
        "certificate restored"
    );

    Ok(ApiResponse::acknowledge("Certificate restored successfully"))
}
