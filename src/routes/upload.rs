/**
 * Upload Routes
 * Multipart storage for avatars, course media and documents, plus file
 * inspection and orphan cleanup under the upload root.
 */
use axum::{
    extract::{Multipart, Path, Query},
    http::HeaderMap,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::PathBuf};

use crate::config::CONFIG;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::routes::guard::{require_admin, require_teacher, require_user};
use crate::routes::{page_window, ApiResponse, Pagination};

/// Most files accepted in one request.
pub const MAX_FILES_PER_REQUEST: usize = 10;

/// Cap for the `multiple` and `course-documents` endpoints.
pub const MAX_MULTIPLE_FILES: usize = 5;

pub const ALLOWED_FOLDERS: &[&str] = &["avatars", "courses", "videos", "documents", "certificates"];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "wmv", "mkv"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "txt", "ppt", "pptx"];

// ============================================================================
// Field rules
// ============================================================================

/// Multipart field names that may carry files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadField {
    Avatar,
    CourseImage,
    CourseVideo,
    Documents,
}

impl UploadField {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "avatar" => Some(Self::Avatar),
            "courseImage" => Some(Self::CourseImage),
            "courseVideo" => Some(Self::CourseVideo),
            "documents" => Some(Self::Documents),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Avatar => "avatar",
            Self::CourseImage => "courseImage",
            Self::CourseVideo => "courseVideo",
            Self::Documents => "documents",
        }
    }

    pub fn folder(self) -> &'static str {
        match self {
            Self::Avatar => "avatars",
            Self::CourseImage => "courses",
            Self::CourseVideo => "videos",
            Self::Documents => "documents",
        }
    }

    fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Avatar | Self::CourseImage => IMAGE_EXTENSIONS,
            Self::CourseVideo => VIDEO_EXTENSIONS,
            Self::Documents => DOCUMENT_EXTENSIONS,
        }
    }

    fn is_image(self) -> bool {
        matches!(self, Self::Avatar | Self::CourseImage)
    }

    fn accepts_mime(self, mime: &str) -> bool {
        let mime = mime.to_ascii_lowercase();
        match self {
            Self::Avatar | Self::CourseImage => {
                matches!(mime.as_str(), "image/jpeg" | "image/jpg" | "image/png" | "image/gif")
            }
            Self::CourseVideo => matches!(
                mime.as_str(),
                "video/mp4"
                    | "video/avi"
                    | "video/x-msvideo"
                    | "video/mov"
                    | "video/quicktime"
                    | "video/wmv"
                    | "video/x-ms-wmv"
                    | "video/mkv"
                    | "video/x-matroska"
            ),
            Self::Documents => matches!(
                mime.as_str(),
                "application/pdf"
                    | "application/msword"
                    | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                    | "application/vnd.ms-powerpoint"
                    | "application/vnd.openxmlformats-officedocument.presentationml.presentation"
                    | "text/plain"
            ),
        }
    }
}

fn validate_image_magic_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        _ => None,
    }
}

fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    (!ext.is_empty()).then_some(ext)
}

/// True for a plain file name with no traversal or separators.
pub fn sanitize_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains('\0')
}

pub fn is_allowed_folder(folder: &str) -> bool {
    ALLOWED_FOLDERS.contains(&folder)
}

/// `<field>-<millis>-<random>.<ext>`
fn stored_name(field: UploadField, ext: &str) -> String {
    let suffix: u32 = rand::rng().random_range(0..1_000_000_000);
    format!(
        "{}-{}-{}.{}",
        field.name(),
        Utc::now().timestamp_millis(),
        suffix,
        ext
    )
}

fn size_label(bytes: usize) -> String {
    const MB: usize = 1024 * 1024;
    if bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else {
        format!("{} bytes", bytes)
    }
}

fn upload_root() -> PathBuf {
    PathBuf::from(&CONFIG.upload_dir)
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub filename: String,
    pub original_name: String,
    pub mimetype: String,
    pub size: usize,
    pub url: String,
    #[serde(skip)]
    pub field: Option<UploadField>,
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    pub files: Vec<StoredFile>,
    pub count: usize,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseFiles {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_image: Option<StoredFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_video: Option<StoredFile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<StoredFile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub filename: String,
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub url: String,
    pub exists: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderListing {
    pub files: Vec<FileInfo>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub deleted_files: Vec<String>,
    pub deleted_count: usize,
    pub errors: Vec<String>,
    pub error_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// A validated file held in memory until the whole request checks out.
#[derive(Debug)]
pub struct PendingFile {
    pub field: UploadField,
    pub original_name: String,
    pub mimetype: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn invalid_type(field: UploadField) -> ApiError {
    ApiError::bad_request(format!(
        "Invalid file type for {}. Please upload a valid file.",
        field.name()
    ))
}

/// Read every file part, enforcing the per-field caps and type rules.
///
/// `accepted` lists the field names allowed in this request with their
/// maximum counts. Nothing is written to disk here.
pub async fn collect_files(
    multipart: &mut Multipart,
    accepted: &[(UploadField, usize)],
    max_file_size: usize,
) -> ApiResult<Vec<PendingFile>> {
    let mut files: Vec<PendingFile> = Vec::new();

    while let Some(mut part) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Multipart error: {}", e);
        ApiError::bad_request("Invalid multipart data")
    })? {
        // Plain text parts ride along with some forms.
        let Some(original_name) = part.file_name().map(str::to_string) else {
            continue;
        };

        let field = part
            .name()
            .and_then(UploadField::parse)
            .ok_or_else(|| ApiError::bad_request("Unexpected file field."))?;
        let (_, max_count) = accepted
            .iter()
            .find(|(f, _)| *f == field)
            .ok_or_else(|| ApiError::bad_request("Unexpected file field."))?;

        if files.len() >= MAX_FILES_PER_REQUEST {
            return Err(ApiError::bad_request(format!(
                "Too many files. Maximum is {} files.",
                MAX_FILES_PER_REQUEST
            )));
        }
        if files.iter().filter(|f| f.field == field).count() >= *max_count {
            return Err(ApiError::bad_request("Unexpected file field."));
        }

        let extension = extension_of(&original_name)
            .filter(|ext| field.extensions().contains(&ext.as_str()))
            .ok_or_else(|| invalid_type(field))?;
        let mimetype = part
            .content_type()
            .map(str::to_string)
            .unwrap_or_default();
        if !field.accepts_mime(&mimetype) {
            return Err(invalid_type(field));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = part.chunk().await.map_err(|e| {
            tracing::warn!("Failed to read upload bytes: {}", e);
            ApiError::bad_request("Failed to read file data")
        })? {
            if bytes.len() + chunk.len() > max_file_size {
                return Err(ApiError::bad_request(format!(
                    "File too large. Maximum size is {}.",
                    size_label(max_file_size)
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(ApiError::bad_request("Empty file"));
        }
        if field.is_image() && validate_image_magic_bytes(&bytes).is_none() {
            return Err(ApiError::bad_request(
                "File content does not match an allowed image type.",
            ));
        }

        files.push(PendingFile {
            field,
            original_name,
            mimetype,
            extension,
            bytes,
        });
    }

    Ok(files)
}

/// Remove files written earlier in a request that is failing.
pub async fn discard_files(files: &[StoredFile]) {
    for file in files {
        if let Err(e) = tokio::fs::remove_file(&file.path).await {
            tracing::warn!("Failed to remove {}: {}", file.path.display(), e);
        }
    }
}

/// Write every pending file, removing the ones already written if any fails.
pub async fn store_files(pending: Vec<PendingFile>) -> ApiResult<Vec<StoredFile>> {
    let root = upload_root();
    let mut stored: Vec<StoredFile> = Vec::with_capacity(pending.len());

    for file in pending {
        let dir = root.join(file.field.folder());
        let filename = stored_name(file.field, &file.extension);
        let path = dir.join(&filename);

        let written = async {
            tokio::fs::create_dir_all(&dir).await?;
            tokio::fs::write(&path, &file.bytes).await
        }
        .await;

        if let Err(e) = written {
            tracing::error!("Failed to write upload file {}: {}", path.display(), e);
            discard_files(&stored).await;
            return Err(ApiError::internal("Failed to save file"));
        }

        tracing::info!("File uploaded: {} ({} bytes)", filename, file.bytes.len());
        stored.push(StoredFile {
            url: format!("/uploads/{}/{}", file.field.folder(), filename),
            filename,
            original_name: file.original_name,
            mimetype: file.mimetype,
            size: file.bytes.len(),
            field: Some(file.field),
            path,
        });
    }

    Ok(stored)
}

async fn receive(
    multipart: &mut Multipart,
    accepted: &[(UploadField, usize)],
) -> ApiResult<Vec<StoredFile>> {
    let pending = collect_files(multipart, accepted, CONFIG.max_file_size).await?;
    store_files(pending).await
}

async fn single(field: UploadField, mut multipart: Multipart) -> ApiResult<StoredFile> {
    receive(&mut multipart, &[(field, 1)])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::bad_request("No file uploaded"))
}

async fn multiple(field: UploadField, mut multipart: Multipart) -> ApiResult<FileList> {
    let files = receive(&mut multipart, &[(field, MAX_MULTIPLE_FILES)]).await?;
    if files.is_empty() {
        return Err(ApiError::bad_request("No files uploaded"));
    }
    Ok(FileList {
        count: files.len(),
        files,
    })
}

/// Resolve `<root>/<folder>/<filename>` after checking both segments.
fn resolve(folder: Option<&str>, filename: &str) -> ApiResult<(PathBuf, String)> {
    if !sanitize_filename(filename) {
        return Err(ApiError::bad_request("Invalid filename"));
    }
    match folder {
        Some(folder) if !is_allowed_folder(folder) => {
            Err(ApiError::bad_request("Invalid folder specified"))
        }
        Some(folder) => Ok((
            upload_root().join(folder).join(filename),
            format!("/uploads/{}/{}", folder, filename),
        )),
        None => Ok((
            upload_root().join(filename),
            format!("/uploads/{}", filename),
        )),
    }
}

async fn file_info(path: &std::path::Path, filename: String, url: String) -> Option<FileInfo> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    if !metadata.is_file() {
        return None;
    }
    Some(FileInfo {
        filename,
        size: metadata.len(),
        created: metadata.created().ok().map(DateTime::<Utc>::from),
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        url,
        exists: true,
    })
}

async fn delete_at(folder: Option<&str>, filename: &str) -> ApiResult<()> {
    let (path, _) = resolve(folder, filename)?;
    if file_info(&path, filename.to_string(), String::new()).await.is_none() {
        return Err(ApiError::not_found("File not found"));
    }
    tokio::fs::remove_file(&path).await.map_err(|e| {
        tracing::error!("Failed to delete file {}: {}", path.display(), e);
        ApiError::internal("Failed to delete file")
    })?;
    tracing::info!("File deleted: {}", path.display());
    Ok(())
}

async fn info_at(folder: Option<&str>, filename: &str) -> ApiResult<FileInfo> {
    let (path, url) = resolve(folder, filename)?;
    file_info(&path, filename.to_string(), url)
        .await
        .ok_or_else(|| ApiError::not_found("File not found"))
}

/// Delete files in `folder` whose names are not in `referenced`.
async fn sweep_folder(folder: &str, referenced: &HashSet<String>, report: &mut CleanupReport) {
    let dir = upload_root().join(folder);
    let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
        return;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if referenced.contains(&name) || !entry.path().is_file() {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => report.deleted_files.push(format!("{}/{}", folder, name)),
            Err(e) => report
                .errors
                .push(format!("Failed to delete {}/{}: {}", folder, name, e)),
        }
    }
}

fn basenames(urls: Vec<(String,)>) -> HashSet<String> {
    urls.into_iter()
        .filter_map(|(url,)| url.rsplit('/').next().map(str::to_string))
        .collect()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/upload/single/{fieldName}
pub async fn upload_single(
    headers: HeaderMap,
    Path(field_name): Path<String>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    require_user(&headers).await?;
    let field = UploadField::parse(&field_name)
        .ok_or_else(|| ApiError::bad_request("Unexpected file field."))?;
    Ok(ApiResponse::success(single(field, multipart).await?))
}

/// POST /api/upload/multiple/{fieldName}
pub async fn upload_multiple(
    headers: HeaderMap,
    Path(field_name): Path<String>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    require_user(&headers).await?;
    let field = UploadField::parse(&field_name)
        .ok_or_else(|| ApiError::bad_request("Unexpected file field."))?;
    Ok(ApiResponse::success(multiple(field, multipart).await?))
}

/// POST /api/upload/course-files
/// Mixed course image, video and documents in one form.
pub async fn upload_course_files(
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    require_teacher(&headers).await?;

    let files = receive(
        &mut multipart,
        &[
            (UploadField::CourseImage, 1),
            (UploadField::CourseVideo, 1),
            (UploadField::Documents, MAX_MULTIPLE_FILES),
        ],
    )
    .await?;
    if files.is_empty() {
        return Err(ApiError::bad_request("No valid files uploaded"));
    }

    let mut grouped = CourseFiles::default();
    for file in files {
        match file.field {
            Some(UploadField::CourseImage) => grouped.course_image = Some(file),
            Some(UploadField::CourseVideo) => grouped.course_video = Some(file),
            _ => grouped.documents.push(file),
        }
    }

    Ok(ApiResponse::success(grouped))
}

/// POST /api/upload/course-image
pub async fn upload_course_image(
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    require_teacher(&headers).await?;
    Ok(ApiResponse::success(
        single(UploadField::CourseImage, multipart).await?,
    ))
}

/// POST /api/upload/course-video
pub async fn upload_course_video(
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    require_teacher(&headers).await?;
    Ok(ApiResponse::success(
        single(UploadField::CourseVideo, multipart).await?,
    ))
}

/// POST /api/upload/course-documents
pub async fn upload_course_documents(
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    require_teacher(&headers).await?;
    Ok(ApiResponse::success(
        multiple(UploadField::Documents, multipart).await?,
    ))
}

/// POST /api/users/upload/avatar
/// Stores the avatar and points the caller's profile at it.
pub async fn upload_avatar(headers: HeaderMap, multipart: Multipart) -> ApiResult<impl IntoResponse> {
    let user = require_user(&headers).await?;
    let pool = db::require_pool()?;

    let file = single(UploadField::Avatar, multipart).await?;

    let updated = sqlx::query("UPDATE users SET avatar = $2, updated_at = now() WHERE id = $1")
        .bind(user.id)
        .bind(&file.url)
        .execute(pool.as_ref())
        .await;
    if let Err(e) = updated {
        discard_files(std::slice::from_ref(&file)).await;
        return Err(ApiError::Database(e));
    }

    // The previous avatar is no longer referenced once the row points elsewhere.
    if let Some(previous) = user.avatar.as_deref() {
        if let Some(name) = previous.strip_prefix("/uploads/avatars/") {
            if sanitize_filename(name) {
                let _ = tokio::fs::remove_file(upload_root().join("avatars").join(name)).await;
            }
        }
    }

    Ok(ApiResponse::success(serde_json::json!({ "avatar": file.url })))
}

/// DELETE /api/upload/{folder}/{filename}
pub async fn delete_file(
    headers: HeaderMap,
    Path((folder, filename)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    require_user(&headers).await?;
    delete_at(Some(&folder), &filename).await?;
    Ok(ApiResponse::acknowledge("File deleted successfully"))
}

/// DELETE /api/upload/{filename}
pub async fn delete_root_file(
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_user(&headers).await?;
    delete_at(None, &filename).await?;
    Ok(ApiResponse::acknowledge("File deleted successfully"))
}

/// GET /api/upload/info/{folder}/{filename}
pub async fn get_file_info(
    headers: HeaderMap,
    Path((folder, filename)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    require_user(&headers).await?;
    Ok(ApiResponse::success(info_at(Some(&folder), &filename).await?))
}

/// GET /api/upload/info/{filename}
pub async fn get_root_file_info(
    headers: HeaderMap,
    Path(filename): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_user(&headers).await?;
    Ok(ApiResponse::success(info_at(None, &filename).await?))
}

/// GET /api/upload/list/{folder}
pub async fn list_files(
    headers: HeaderMap,
    Path(folder): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    require_user(&headers).await?;
    if !is_allowed_folder(&folder) {
        return Err(ApiError::bad_request("Invalid folder specified"));
    }
    let window = page_window(query.page, query.limit, 20)?;

    let dir = upload_root().join(&folder);
    let mut files = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(&dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let url = format!("/uploads/{}/{}", folder, name);
            if let Some(info) = file_info(&entry.path(), name, url).await {
                files.push(info);
            }
        }
    }

    // Newest first
    files.sort_by(|a, b| b.modified.cmp(&a.modified));

    let total = files.len() as i64;
    let files = files
        .into_iter()
        .skip(window.offset() as usize)
        .take(window.limit as usize)
        .collect();

    Ok(ApiResponse::success(FolderListing {
        files,
        pagination: window.pagination(total),
    }))
}

/// POST /api/upload/cleanup
/// Removes avatars and course images that no row references.
pub async fn cleanup_orphaned_files(headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    require_admin(&headers).await?;
    let pool = db::require_pool()?;

    let avatars: Vec<(String,)> =
        sqlx::query_as("SELECT avatar FROM users WHERE avatar IS NOT NULL")
            .fetch_all(pool.as_ref())
            .await?;
    let images: Vec<(String,)> =
        sqlx::query_as("SELECT image FROM courses WHERE image IS NOT NULL")
            .fetch_all(pool.as_ref())
            .await?;

    let mut report = CleanupReport {
        deleted_files: Vec::new(),
        deleted_count: 0,
        errors: Vec::new(),
        error_count: 0,
    };
    sweep_folder("avatars", &basenames(avatars), &mut report).await;
    sweep_folder("courses", &basenames(images), &mut report).await;
    report.deleted_count = report.deleted_files.len();
    report.error_count = report.errors.len();

    tracing::info!(
        deleted = report.deleted_count,
        errors = report.error_count,
        "orphaned upload cleanup finished"
    );

    Ok(ApiResponse::success(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::{delete, post};
    use axum::{Json, Router};
    use tower::ServiceExt;

    const BOUNDARY: &str = "learnhub-test-boundary";
    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];

    fn multipart_body(parts: &[(&str, &str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, content_type, bytes) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    name, filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    /// Runs `collect_files` with the course-files rules and a 16 byte cap.
    async fn probe(mut multipart: Multipart) -> ApiResult<Json<Vec<String>>> {
        let files = collect_files(
            &mut multipart,
            &[(UploadField::CourseImage, 1), (UploadField::Documents, 2)],
            16,
        )
        .await?;
        Ok(Json(files.into_iter().map(|f| f.extension).collect()))
    }

    async fn send(parts: &[(&str, &str, &str, &[u8])]) -> (StatusCode, serde_json::Value) {
        let app = Router::new().route("/probe", post(probe));
        let req = Request::builder()
            .method("POST")
            .uri("/probe")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[test]
    fn test_field_folders() {
        assert_eq!(UploadField::parse("avatar").unwrap().folder(), "avatars");
        assert_eq!(UploadField::parse("courseImage").unwrap().folder(), "courses");
        assert_eq!(UploadField::parse("courseVideo").unwrap().folder(), "videos");
        assert_eq!(UploadField::parse("documents").unwrap().folder(), "documents");
        assert!(UploadField::parse("resume").is_none());
    }

    #[test]
    fn test_type_rules() {
        assert!(UploadField::Avatar.accepts_mime("image/png"));
        assert!(!UploadField::Avatar.accepts_mime("image/webp"));
        assert!(UploadField::CourseVideo.accepts_mime("video/mp4"));
        assert!(UploadField::Documents.accepts_mime("text/plain"));
        assert!(!UploadField::Documents.accepts_mime("application/zip"));
        assert!(UploadField::Documents.extensions().contains(&"pptx"));
        assert_eq!(extension_of("Slides.PPTX").as_deref(), Some("pptx"));
        assert_eq!(extension_of("README"), None);
    }

    #[test]
    fn test_magic_bytes() {
        assert_eq!(validate_image_magic_bytes(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(validate_image_magic_bytes(PNG), Some("image/png"));
        assert_eq!(validate_image_magic_bytes(b"GIF89a"), Some("image/gif"));
        assert_eq!(validate_image_magic_bytes(b"<svg>"), None);
        assert_eq!(validate_image_magic_bytes(&[0xFF]), None);
    }

    #[test]
    fn test_sanitize_filename_rejects_traversal() {
        assert!(sanitize_filename("avatar-1-2.png"));
        assert!(!sanitize_filename("../etc/passwd"));
        assert!(!sanitize_filename("a/b.png"));
        assert!(!sanitize_filename("a\\b.png"));
        assert!(!sanitize_filename("a\0.png"));
        assert!(!sanitize_filename(""));
    }

    #[test]
    fn test_resolve_checks_folder() {
        assert!(resolve(Some("avatars"), "a.png").is_ok());
        assert!(matches!(
            resolve(Some("secrets"), "a.png"),
            Err(ApiError::BadRequest(_))
        ));
        assert!(resolve(None, "..").is_err());
        let (_, url) = resolve(Some("documents"), "doc.pdf").unwrap();
        assert_eq!(url, "/uploads/documents/doc.pdf");
    }

    #[test]
    fn test_stored_name_format() {
        let name = stored_name(UploadField::CourseImage, "png");
        let parts: Vec<&str> = name.trim_end_matches(".png").split('-').collect();
        assert_eq!(parts[0], "courseImage");
        assert!(parts[1].parse::<i64>().is_ok());
        assert!(parts[2].parse::<u32>().is_ok());
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn test_size_label() {
        assert_eq!(size_label(5 * 1024 * 1024), "5MB");
        assert_eq!(size_label(16), "16 bytes");
    }

    #[tokio::test]
    async fn test_collect_accepts_valid_files() {
        let (status, body) = send(&[
            ("courseImage", "cover.png", "image/png", PNG),
            ("documents", "notes.txt", "text/plain", b"hello".as_slice()),
        ])
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!(["png", "txt"]));
    }

    #[tokio::test]
    async fn test_collect_rejects_spoofed_image() {
        let (status, body) = send(&[(
            "courseImage",
            "cover.png",
            "image/png",
            b"not an image".as_slice(),
        )])
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "File content does not match an allowed image type.");
    }

    #[tokio::test]
    async fn test_collect_rejects_wrong_extension() {
        let (status, body) = send(&[("documents", "run.exe", "text/plain", b"MZ".as_slice())]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Invalid file type for documents. Please upload a valid file."
        );
    }

    #[tokio::test]
    async fn test_collect_rejects_oversized_file() {
        let (status, body) = send(&[("documents", "big.txt", "text/plain", [b'a'; 32].as_slice())]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "File too large. Maximum size is 16 bytes.");
    }

    #[tokio::test]
    async fn test_collect_rejects_unexpected_and_extra_fields() {
        let (status, _) = send(&[("avatar", "me.png", "image/png", PNG)]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&[
            ("courseImage", "a.png", "image/png", PNG),
            ("courseImage", "b.png", "image/png", PNG),
        ])
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Unexpected file field.");
    }

    #[tokio::test]
    async fn test_upload_routes_require_auth() {
        let app = Router::new()
            .route("/api/upload/single/{name}", post(upload_single))
            .route("/api/upload/{name}/{filename}", delete(delete_file));

        let req = Request::builder()
            .method("POST")
            .uri("/api/upload/single/avatar")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(&[])))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .method("DELETE")
            .uri("/api/upload/avatars/a.png")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_store_and_discard_round() {
        let pending = vec![PendingFile {
            field: UploadField::Documents,
            original_name: "notes.txt".to_string(),
            mimetype: "text/plain".to_string(),
            extension: "txt".to_string(),
            bytes: b"hello".to_vec(),
        }];
        let stored = store_files(pending).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].url.starts_with("/uploads/documents/documents-"));
        assert!(tokio::fs::metadata(&stored[0].path).await.is_ok());

        discard_files(&stored).await;
        assert!(tokio::fs::metadata(&stored[0].path).await.is_err());
    }
}
