use crate::error::{AppError, Result};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 255;
const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 128;

/// Validates a login name before any credential lookup is made.
///
/// Letters, digits and `_ - . @` are accepted so email-style logins work.
pub fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(AppError::Validation(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN, USERNAME_MAX
        )));
    }

    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'))
    {
        return Err(AppError::Validation(
            "Username contains invalid characters".to_string(),
        ));
    }

    Ok(())
}

/// Validates a new password.
///
/// # Arguments
///
/// * `password` - The password to validate.
pub fn validate_password(password: &str) -> Result<()> {
    if password.len() < PASSWORD_MIN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters long",
            PASSWORD_MIN
        )));
    }

    if password.len() > PASSWORD_MAX {
        return Err(AppError::Validation(format!(
            "Password must be at most {} characters",
            PASSWORD_MAX
        )));
    }

    Ok(())
}
