//! Process configuration read from the environment (after `.env` is loaded).

use std::net::SocketAddr;

/// Secret used when `JWT_SECRET` is unset. Refused in production.
pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

lazy_static::lazy_static! {
    pub static ref CONFIG: AppConfig = AppConfig::from_env();

    /// HS256 signing key for access tokens.
    pub static ref JWT_SECRET: String = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string());
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub host: String,
    pub port: u16,
    /// Root directory for stored uploads and generated certificates.
    pub upload_dir: String,
    /// Per-file upload cap in bytes.
    pub max_file_size: usize,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    /// Attempts allowed per client IP inside one window on login/register.
    pub auth_rate_limit_max: u32,
    pub auth_rate_limit_window_secs: i64,
    pub client_url: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            environment: env_or("ENVIRONMENT", "development".to_string()),
            host: env_or("HOST", "127.0.0.1".to_string()),
            port: env_or("PORT", 3001),
            upload_dir: env_or("UPLOAD_PATH", "./uploads".to_string()),
            max_file_size: env_or("MAX_FILE_SIZE", 5 * 1024 * 1024),
            access_token_minutes: env_or("JWT_EXPIRE_MINUTES", 15),
            refresh_token_days: env_or("JWT_REFRESH_EXPIRE_DAYS", 7),
            auth_rate_limit_max: env_or("LOGIN_RATE_LIMIT_MAX", 5),
            auth_rate_limit_window_secs: env_or("LOGIN_RATE_LIMIT_WINDOW_SECS", 15 * 60),
            client_url: env_or("CLIENT_URL", "http://localhost:3000".to_string()),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}
