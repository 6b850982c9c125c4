use crate::{covers::CoverUpload, error::ValidationErrors};

pub const MAX_STRING_LENGTH: usize = 255;
pub const MIN_PASSWORD_LENGTH: usize = 8;

fn required(errors: &mut ValidationErrors, field: &str, value: &str) -> bool {
    if value.trim().is_empty() {
        errors.add(field, format!("The {field} field is required."));
        false
    } else {
        true
    }
}

fn max_length(errors: &mut ValidationErrors, field: &str, value: &str) {
    if value.chars().count() > MAX_STRING_LENGTH {
        errors.add(
            field,
            format!("The {field} must not be greater than {MAX_STRING_LENGTH} characters."),
        );
    }
}

/// is_valid_email
///
/// Structural check: one `@`, a non-empty local part, a dotted domain whose labels
/// are non-empty, and no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

/// password_rule_failures
///
/// Messages for every complexity rule `password` breaks, in rule order:
/// length, mixed case, symbol, number.
pub fn password_rule_failures(password: &str) -> Vec<String> {
    let mut failures = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        failures.push(format!(
            "The password must be at least {MIN_PASSWORD_LENGTH} characters."
        ));
    }
    if !(password.chars().any(char::is_uppercase) && password.chars().any(char::is_lowercase)) {
        failures.push(
            "The password must contain at least one uppercase and one lowercase letter."
                .to_string(),
        );
    }
    if !password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
    {
        failures.push("The password must contain at least one symbol.".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        failures.push("The password must contain at least one number.".to_string());
    }
    failures
}

/// validate_registration
///
/// Field rules for `POST /register`. Uniqueness of the email is checked by the
/// handler against the repository and appended to the same error map.
pub fn validate_registration(name: &str, email: &str, password: &str) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    if required(&mut errors, "name", name) {
        max_length(&mut errors, "name", name);
    }

    if required(&mut errors, "email", email) {
        if !is_valid_email(email) {
            errors.add("email", "The email must be a valid email address.");
        }
        max_length(&mut errors, "email", email);
    }

    if required(&mut errors, "password", password) {
        for failure in password_rule_failures(password) {
            errors.add("password", failure);
        }
    }

    errors
}

pub fn validate_login(email: &str, password: &str) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    if required(&mut errors, "email", email) && !is_valid_email(email) {
        errors.add("email", "The email must be a valid email address.");
    }
    required(&mut errors, "password", password);
    errors
}

fn validate_title(errors: &mut ValidationErrors, title: &str) {
    if required(errors, "title", title) {
        max_length(errors, "title", title);
    }
}

fn validate_cover(errors: &mut ValidationErrors, cover: Option<&CoverUpload>) {
    if let Some(cover) = cover {
        if !cover.is_image() {
            errors.add("cover", "The cover must be an image.");
        }
    }
}

/// validate_new_article
///
/// Title and content are required; the cover is optional but must be an image.
pub fn validate_new_article(
    title: Option<&str>,
    content: Option<&str>,
    cover: Option<&CoverUpload>,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    validate_title(&mut errors, title.unwrap_or_default());
    required(&mut errors, "content", content.unwrap_or_default());
    validate_cover(&mut errors, cover);
    errors
}

/// validate_article_changes
///
/// Only fields that are present are checked, but a present field may not be empty.
pub fn validate_article_changes(
    title: Option<&str>,
    content: Option<&str>,
    cover: Option<&CoverUpload>,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    if let Some(title) = title {
        validate_title(&mut errors, title);
    }
    if let Some(content) = content {
        required(&mut errors, "content", content);
    }
    validate_cover(&mut errors, cover);
    errors
}
