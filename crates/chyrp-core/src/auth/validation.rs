//! Client-side checks run before any credentials leave the process.

use super::error::{AuthError, FieldErrors};
use crate::models::{LoginCredentials, RegisterData};

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MIN_PASSWORD_LENGTH: usize = 8;

pub fn validate_login(credentials: &LoginCredentials) -> Result<(), AuthError> {
    let mut errors = FieldErrors::new();
    if credentials.identifier.trim().is_empty() {
        errors.add("username", "Username is required");
    }
    if credentials.secret.is_empty() {
        errors.add("password", "Password is required");
    }
    into_result(errors)
}

pub fn validate_registration(data: &RegisterData) -> Result<(), AuthError> {
    let mut errors = FieldErrors::new();
    if data.username.trim().chars().count() < MIN_USERNAME_LENGTH {
        errors.add(
            "username",
            format!("Username must be at least {} characters", MIN_USERNAME_LENGTH),
        );
    }
    if !is_valid_email(&data.email) {
        errors.add("email", "Invalid email address");
    }
    if data.first_name.trim().is_empty() {
        errors.add("first_name", "First name is required");
    }
    if data.last_name.trim().is_empty() {
        errors.add("last_name", "Last name is required");
    }
    if data.password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.add(
            "password",
            format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
        );
    }
    if data.password != data.password_confirm {
        errors.add("password_confirm", "Passwords don't match");
    }
    into_result(errors)
}

fn into_result(errors: FieldErrors) -> Result<(), AuthError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AuthError::ValidationFailed(errors))
    }
}

/// Loose shape check: `local@domain.tld`, no whitespace
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((name, tld)) => !name.is_empty() && !tld.is_empty() && !name.starts_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_registration() -> RegisterData {
        RegisterData {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            password: "wonderland".to_string(),
            password_confirm: "wonderland".to_string(),
        }
    }

    fn field_errors(result: Result<(), AuthError>) -> FieldErrors {
        match result {
            Err(AuthError::ValidationFailed(errors)) => errors,
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_registration_passes() {
        assert!(validate_registration(&valid_registration()).is_ok());
    }

    #[test]
    fn test_password_mismatch() {
        let mut data = valid_registration();
        data.password_confirm = "wonderlant".to_string();
        let errors = field_errors(validate_registration(&data));
        assert_eq!(errors.get("password_confirm"), ["Passwords don't match".to_string()]);
        assert_eq!(errors.fields().count(), 1);
    }

    #[test]
    fn test_every_field_checked() {
        let data = RegisterData {
            username: "al".to_string(),
            email: "alice".to_string(),
            password: "short".to_string(),
            password_confirm: "short".to_string(),
            ..RegisterData::default()
        };
        let errors = field_errors(validate_registration(&data));
        for field in ["username", "email", "first_name", "last_name", "password"] {
            assert!(!errors.get(field).is_empty(), "missing error for {}", field);
        }
        assert!(errors.get("password_confirm").is_empty());
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last@mail.example.org"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a@example"));
        assert!(!is_valid_email("a@.com"));
        assert!(!is_valid_email("a@b@c.com"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("a@example."));
    }

    #[test]
    fn test_login_requires_both_fields() {
        assert!(validate_login(&LoginCredentials::new("alice", "pw")).is_ok());
        let errors = field_errors(validate_login(&LoginCredentials::new("  ", "")));
        assert_eq!(errors.fields().count(), 2);
    }
}
