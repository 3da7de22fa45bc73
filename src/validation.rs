//! Field validation helpers.
//!
//! Handlers build a [`Validator`], run every rule for the request, and turn
//! the collected failures into a single 400 response.

use regex::Regex;

use crate::error::{ApiError, FieldError};

lazy_static::lazy_static! {
    static ref NAME_RE: Regex = Regex::new(r"^[a-zA-Z\s]+$").unwrap();
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$").unwrap();
    static ref URL_RE: Regex =
        Regex::new(r"^(https?://)?([A-Za-z0-9\-]+\.)+[A-Za-z]{2,}(:\d{1,5})?(/\S*)?$").unwrap();
    static ref LOCAL_URL_RE: Regex =
        Regex::new(r"^https?://(localhost|127\.0\.0\.1)(:\d{1,5})?(/\S*)?$").unwrap();
}

#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` against `field` unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    /// Character length of the trimmed value within `min..=max`.
    pub fn length(
        &mut self,
        field: &str,
        value: &str,
        min: usize,
        max: usize,
        message: &str,
    ) -> &mut Self {
        let len = value.trim().chars().count();
        self.check(len >= min && len <= max, field, message)
    }

    pub fn max_length(&mut self, field: &str, value: &str, max: usize, message: &str) -> &mut Self {
        self.length(field, value, 0, max, message)
    }

    pub fn optional_max_length(
        &mut self,
        field: &str,
        value: Option<&str>,
        max: usize,
        message: &str,
    ) -> &mut Self {
        match value {
            Some(value) => self.max_length(field, value, max, message),
            None => self,
        }
    }

    pub fn add(&mut self, field: &str, message: &str) -> &mut Self {
        self.check(false, field, message)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}

pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name.trim())
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Lower-cased, trimmed form used for storage and lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// At least one lower-case letter, one upper-case letter and one digit.
pub fn is_strong_password(password: &str) -> bool {
    password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// Domain-style URL. The scheme is optional unless `require_scheme`.
pub fn is_valid_url(url: &str, require_scheme: bool) -> bool {
    let url = url.trim();
    if require_scheme && !(url.starts_with("http://") || url.starts_with("https://")) {
        return false;
    }
    URL_RE.is_match(url) || LOCAL_URL_RE.is_match(url)
}

/// Password rules shared by registration and password changes.
pub fn check_password(validator: &mut Validator, field: &str, label: &str, password: &str) {
    let len = password.chars().count();
    validator.check(
        (6..=128).contains(&len),
        field,
        &format!("{label} must be between 6 and 128 characters"),
    );
    validator.check(
        is_strong_password(password),
        field,
        &format!(
            "{label} must contain at least one lowercase letter, one uppercase letter, and one number"
        ),
    );
}

/// Trimmed value, or `None` when nothing but whitespace was sent.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Strip markup that could execute in the browser from free text.
pub fn clean_rich_text(value: &str) -> String {
    ammonia::clean(value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert!(is_valid_name("Ada Lovelace"));
        assert!(!is_valid_name("R2-D2"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn test_emails() {
        assert!(is_valid_email("student@example.com"));
        assert!(is_valid_email("first.last+tag@mail.example.co"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }

    #[test]
    fn test_password_strength() {
        assert!(is_strong_password("Secret123"));
        assert!(!is_strong_password("secret123"));
        assert!(!is_strong_password("SECRET123"));
        assert!(!is_strong_password("SecretOnly"));
    }

    #[test]
    fn test_check_password_reports_both_rules() {
        let mut v = Validator::new();
        check_password(&mut v, "password", "Password", "abc");
        match v.finish() {
            Err(ApiError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_urls() {
        assert!(is_valid_url("https://example.com/intro.mp4", true));
        assert!(is_valid_url("example.com", false));
        assert!(!is_valid_url("example.com", true));
        assert!(is_valid_url("http://localhost:5000/uploads/videos/a.mp4", true));
        assert!(!is_valid_url("javascript:alert(1)", false));
    }

    #[test]
    fn test_validator_collects_in_order() {
        let mut v = Validator::new();
        v.length("title", "abc", 5, 100, "Course title must be between 5 and 100 characters")
            .check(false, "price", "Price must be between 0 and 9999.99")
            .optional_max_length("bio", None, 500, "Bio cannot exceed 500 characters");
        match v.finish() {
            Err(ApiError::Validation(errors)) => {
                assert_eq!(errors[0].field, "title");
                assert_eq!(errors[1].field, "price");
                assert_eq!(errors.len(), 2);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_length_counts_trimmed_chars() {
        let mut v = Validator::new();
        v.length("title", "  héllo  ", 5, 5, "bad");
        assert!(v.is_empty());
    }

    #[test]
    fn test_non_blank_and_clean() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(Some(" x ")), Some("x".to_string()));
        assert!(!clean_rich_text("<script>alert(1)</script>Hi").contains("<script>"));
    }
}
