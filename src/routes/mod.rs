pub mod admin;
pub mod auth;
pub mod certificates;
pub mod courses;
pub mod guard;
pub mod health;
pub mod learning;
pub mod upload;
pub mod users;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, FieldError};

/// Success envelope shared by every JSON endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            status: "success".to_string(),
            message: None,
            data: Some(data),
        })
    }

    pub fn success_with_message(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            status: "success".to_string(),
            message: Some(message.into()),
            data: Some(data),
        })
    }

    /// 201 response for newly created resources.
    pub fn created(message: impl Into<String>, data: T) -> impl IntoResponse {
        (StatusCode::CREATED, Self::success_with_message(message, data))
    }
}

impl ApiResponse<()> {
    /// Success with a message and no data.
    pub fn acknowledge(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "success".to_string(),
            message: Some(message.into()),
            data: None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(total: i64, page: i64, limit: i64) -> Self {
        let total_pages = if limit > 0 {
            (total + limit - 1) / limit
        } else {
            0
        };
        Self {
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// Validated `page`/`limit` query pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub limit: i64,
}

impl PageWindow {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn pagination(&self, total: i64) -> Pagination {
        Pagination::new(total, self.page, self.limit)
    }
}

pub const MAX_PAGE_LIMIT: i64 = 100;

/// Largest page whose offset still fits an `i64` at the maximum limit.
pub const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_LIMIT;

pub fn page_window(
    page: Option<i64>,
    limit: Option<i64>,
    default_limit: i64,
) -> Result<PageWindow, ApiError> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(default_limit);

    let mut errors = Vec::new();
    if page < 1 {
        errors.push(FieldError::new("page", "Page must be a positive integer"));
    } else if page > MAX_PAGE {
        errors.push(FieldError::new("page", "Page is out of range"));
    }
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        errors.push(FieldError::new("limit", "Limit must be between 1 and 100"));
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    Ok(PageWindow { page, limit })
}

/// Parse a path segment as a record id.
pub fn parse_id(raw: &str, field: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::invalid(field, "Invalid ID format"))
}
