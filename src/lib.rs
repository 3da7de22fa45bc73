//! LearnHub Backend - library for app logic and testing

pub mod certificate;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod progress;
pub mod routes;
pub mod validation;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, trace::TraceLayer,
};

use crate::config::{CONFIG, DEFAULT_JWT_SECRET, JWT_SECRET};
use crate::routes::{
    admin, auth, certificates, courses, health, learning, upload, users,
};

/// Body cap for every JSON route.
const JSON_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Multipart framing allowance on top of the file payload.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN, then CLIENT_URL.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            [CONFIG.client_url.as_str(), "http://127.0.0.1:3000"]
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect()
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

fn auth_routes() -> Router {
    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/logout", post(auth::logout))
        .route(
            "/api/auth/profile",
            get(auth::get_profile).put(auth::update_profile),
        )
        .route("/api/auth/change-password", put(auth::change_password))
        .route("/api/auth/enrolled-courses", get(auth::enrolled_courses))
}

fn course_routes() -> Router {
    Router::new()
        .route(
            "/api/courses",
            get(courses::list_courses).post(courses::create_course),
        )
        .route("/api/courses/teacher/my-courses", get(courses::teacher_courses))
        .route(
            "/api/courses/{id}",
            get(courses::get_course)
                .put(courses::update_course)
                .delete(courses::delete_course),
        )
        .route("/api/courses/{id}/sections", post(courses::add_section))
        .route(
            "/api/courses/{id}/sections/{section_id}",
            delete(courses::delete_section),
        )
        .route(
            "/api/courses/{id}/sections/{section_id}/lessons",
            post(courses::add_lesson),
        )
        .route(
            "/api/courses/{id}/sections/{section_id}/lessons/{lesson_id}",
            delete(courses::delete_lesson),
        )
        .route("/api/courses/{id}/review", post(courses::add_review))
        .route("/api/courses/{id}/enroll", post(learning::enroll))
        .route("/api/courses/{id}/progress", put(learning::update_progress))
        .route(
            "/api/courses/{id}/lessons/{lesson_id}/progress",
            get(learning::get_lesson_progress),
        )
        .route(
            "/api/courses/{id}/lessons/{lesson_id}/watch",
            put(learning::update_watch_time),
        )
        .route(
            "/api/courses/{id}/lessons/{lesson_id}/bookmarks",
            post(learning::add_bookmark),
        )
        .route(
            "/api/courses/{id}/lessons/{lesson_id}/notes",
            post(learning::add_note),
        )
        .route(
            "/api/courses/{id}/lessons/{lesson_id}/quiz-attempts",
            post(learning::add_quiz_attempt),
        )
}

fn certificate_routes() -> Router {
    Router::new()
        .route(
            "/api/certificates/verify/{certificate_id}/{code}",
            get(certificates::verify_certificate),
        )
        .route("/api/certificates/{id}", get(certificates::get_certificate))
        .route(
            "/api/certificates/{id}/download",
            get(certificates::download_certificate),
        )
        .route(
            "/api/certificates/{id}/revoke",
            put(certificates::revoke_certificate),
        )
        .route(
            "/api/certificates/{id}/restore",
            put(certificates::restore_certificate),
        )
}

fn user_routes() -> Router {
    Router::new()
        .route("/api/users", get(users::list_users))
        .route(
            "/api/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/api/users/{id}/stats", get(users::get_user_stats))
        .route("/api/users/{id}/progress", get(users::get_user_progress))
        .route(
            "/api/users/{id}/certificates",
            get(users::get_user_certificates),
        )
}

fn admin_routes() -> Router {
    Router::new()
        .route("/api/admin/stats", get(admin::platform_stats))
        .route("/api/admin/courses", get(admin::list_courses))
        .route(
            "/api/admin/courses/{id}/status",
            put(admin::update_course_status),
        )
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/{id}/status", put(admin::update_user_status))
        .route(
            "/api/admin/analytics/enrollments",
            get(admin::enrollment_analytics),
        )
        .route("/api/admin/analytics/revenue", get(admin::revenue_analytics))
}

fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health::health_ping))
        .route("/health/detailed", get(health::health_detailed))
        .route("/health/database", get(health::health_database))
        .route("/health/ready", get(health::health_ready))
}

/// Multipart routes, capped by the configured file size instead of the JSON limit.
fn upload_routes() -> Router {
    let body_limit = CONFIG
        .max_file_size
        .saturating_mul(upload::MAX_FILES_PER_REQUEST)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/api/users/upload/avatar", post(upload::upload_avatar))
        .route("/api/upload/single/{name}", post(upload::upload_single))
        .route("/api/upload/multiple/{name}", post(upload::upload_multiple))
        .route("/api/upload/course-files", post(upload::upload_course_files))
        .route("/api/upload/course-image", post(upload::upload_course_image))
        .route("/api/upload/course-video", post(upload::upload_course_video))
        .route(
            "/api/upload/course-documents",
            post(upload::upload_course_documents),
        )
        .route("/api/upload/cleanup", post(upload::cleanup_orphaned_files))
        .route("/api/upload/list/{name}", get(upload::list_files))
        .route("/api/upload/info/{name}", get(upload::get_root_file_info))
        .route(
            "/api/upload/info/{name}/{filename}",
            get(upload::get_file_info),
        )
        .route("/api/upload/{name}", delete(upload::delete_root_file))
        .route("/api/upload/{name}/{filename}", delete(upload::delete_file))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
}

/// Create and configure the application router.
pub fn create_app() -> Router {
    let cors = configure_cors();
    tracing::info!("CORS configured");

    let api = Router::new()
        .merge(auth_routes())
        .merge(course_routes())
        .merge(certificate_routes())
        .merge(user_routes())
        .merge(admin_routes())
        .merge(health_routes())
        .layer(RequestBodyLimitLayer::new(JSON_BODY_LIMIT));

    api.merge(upload_routes())
        .nest_service("/uploads", ServeDir::new(&CONFIG.upload_dir))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Dropping the guards stops the background writers and loses buffered lines.
    let _log_guards = logging::init(&logging::LogConfig::from_env());

    health::init_start_time();

    if CONFIG.is_production() && JWT_SECRET.as_str() == DEFAULT_JWT_SECRET {
        tracing::error!(
            "JWT_SECRET must be set to a secure, unique value in production. \
             Refusing to start with the default secret."
        );
        return;
    }

    if std::env::var("DATABASE_URL").is_ok() {
        match db::init_pool(None).await {
            Ok(pool) => {
                if let Err(e) = db::run_migrations(&pool).await {
                    tracing::error!("Failed to run database migrations: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize database pool: {}. Continuing without database.",
                    e
                );
            }
        }
    } else {
        tracing::info!("DATABASE_URL not set. Running without database connection.");
    }

    if let Err(e) = tokio::fs::create_dir_all(&CONFIG.upload_dir).await {
        tracing::warn!(upload_dir = %CONFIG.upload_dir, "Failed to create upload directory: {}", e);
    }

    let app = create_app();

    let addr = match CONFIG.bind_addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(host = %CONFIG.host, port = CONFIG.port, "Invalid HOST/PORT configuration: {}", e);
            return;
        }
    };
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("Server error: {}", e);
    }
}
