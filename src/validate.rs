use std::sync::OnceLock;

use regex::Regex;

use crate::error::AppError;

const MIN_PASSWORD_LEN: usize = 6;

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid")
    })
}

/// Trims and lowercases, then checks the address shape.
pub fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::validation("email", "Email is required"));
    }
    if !email_regex().is_match(&email) {
        return Err(AppError::validation("email", "Email is not valid"));
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "password",
            "Password must be at least 6 characters",
        ));
    }
    Ok(())
}

pub fn normalize_text(text: &str) -> Result<String, AppError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::validation("text", "Text cannot be empty"));
    }
    Ok(text.to_string())
}
