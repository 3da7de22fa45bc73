//! Create an admin account, or promote an existing user to admin.
//!
//! Usage: create-admin <EMAIL> <PASSWORD> [NAME]
//! Falls back to ADMIN_EMAIL / ADMIN_PASSWORD / ADMIN_NAME.

use bcrypt::{hash, DEFAULT_COST};
use learnhub_backend::{db, error::ApiError, validation};
use std::env;
use std::process::ExitCode;

fn arg_or_env(position: usize, key: &str) -> Option<String> {
    env::args()
        .nth(position)
        .or_else(|| env::var(key).ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let (Some(email), Some(password)) = (arg_or_env(1, "ADMIN_EMAIL"), arg_or_env(2, "ADMIN_PASSWORD"))
    else {
        eprintln!("Usage: cargo run --bin create-admin <EMAIL> <PASSWORD> [NAME]");
        return ExitCode::FAILURE;
    };
    let name = arg_or_env(3, "ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string());

    if !validation::is_valid_email(&email) {
        eprintln!("Invalid email address: {}", email);
        return ExitCode::FAILURE;
    }
    let mut v = validation::Validator::new();
    validation::check_password(&mut v, "password", "Password", &password);
    if let Err(ApiError::Validation(errors)) = v.finish() {
        for error in errors {
            eprintln!("{}", error.message);
        }
        return ExitCode::FAILURE;
    }
    let email = validation::normalize_email(&email);

    let password_hash = match hash(&password, DEFAULT_COST) {
        Ok(hashed) => hashed,
        Err(e) => {
            eprintln!("Error hashing password: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let pool = match db::init_pool(None).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = db::run_migrations(&pool).await {
        eprintln!("Failed to run migrations: {}", e);
        return ExitCode::FAILURE;
    }

    let result: Result<(bool,), sqlx::Error> = sqlx::query_as(
        "INSERT INTO users (name, email, password_hash, role, is_active, is_verified) \
         VALUES ($1, $2, $3, 'admin', true, true) \
         ON CONFLICT (email) DO UPDATE SET role = 'admin', password_hash = EXCLUDED.password_hash, \
         is_active = true, updated_at = now() \
         RETURNING (xmax = 0)",
    )
    .bind(&name)
    .bind(&email)
    .bind(&password_hash)
    .fetch_one(pool.as_ref())
    .await;

    match result {
        Ok((true,)) => println!("Created admin {}", email),
        Ok((false,)) => println!("Promoted {} to admin and reset the password", email),
        Err(e) => {
            eprintln!("Failed to save admin: {}", e);
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
