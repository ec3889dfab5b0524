//! Input validation, applied at the service entry.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("username must be 3-50 characters: letters, digits, underscore")]
    Username,
    #[error("password must be 6-100 bytes")]
    Password,
    #[error("nickname must be 1-50 characters")]
    Nickname,
    #[error("token must not be empty")]
    Token,
    #[error("profile picture must not be empty")]
    ProfilePicture,
}

pub fn username(value: &str) -> Result<(), ValidationError> {
    let len = value.len();
    if !(3..=50).contains(&len) {
        return Err(ValidationError::Username);
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ValidationError::Username);
    }
    Ok(())
}

pub fn password(value: &str) -> Result<(), ValidationError> {
    if !(6..=100).contains(&value.len()) {
        return Err(ValidationError::Password);
    }
    Ok(())
}

/// Nickname length is counted in Unicode code points.
pub fn nickname(value: &str) -> Result<(), ValidationError> {
    let count = value.chars().count();
    if count == 0 || count > 50 {
        return Err(ValidationError::Nickname);
    }
    Ok(())
}

pub fn token(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Token);
    }
    Ok(())
}

pub fn profile_picture(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::ProfilePicture);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_boundaries() {
        assert!(username("abc").is_ok());
        assert!(username("ab").is_err());
        assert!(username(&"a".repeat(50)).is_ok());
        assert!(username(&"a".repeat(51)).is_err());
        assert!(username("user_01").is_ok());
        assert!(username("user-01").is_err());
        assert!(username("user 01").is_err());
        assert!(username("用户名abc").is_err());
    }

    #[test]
    fn password_is_bounded_in_bytes() {
        assert!(password("secret").is_ok());
        assert!(password("short").is_err());
        assert!(password(&"p".repeat(100)).is_ok());
        assert!(password(&"p".repeat(101)).is_err());
    }

    #[test]
    fn nickname_counts_code_points() {
        assert!(nickname("").is_err());
        assert!(nickname("A").is_ok());
        // 50 multi-byte code points are accepted; 51 are not.
        assert!(nickname(&"名".repeat(50)).is_ok());
        assert!(nickname(&"名".repeat(51)).is_err());
    }

    #[test]
    fn token_and_picture_must_be_non_empty() {
        assert!(token("").is_err());
        assert!(token("t").is_ok());
        assert!(profile_picture("").is_err());
        assert!(profile_picture("avatars/a.png").is_ok());
    }
}
