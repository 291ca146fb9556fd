//! Username and password validation
//!
//! Usernames must be:
//! - 3-40 characters
//! - [A-Za-z0-9_.-] characters only
//!
//! Usernames are case-sensitive and stored as given.

use meshgate_common::Error;

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 40;
const MIN_PASSWORD_LEN: usize = 5;

/// Username validation error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsernameError {
    TooShort { min: usize, got: usize },
    TooLong { max: usize, got: usize },
    InvalidCharacter { position: usize, char: char },
}

impl std::fmt::Display for UsernameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { min, got } => {
                write!(f, "Username must be at least {} characters (got {})", min, got)
            }
            Self::TooLong { max, got } => {
                write!(f, "Username must be at most {} characters (got {})", max, got)
            }
            Self::InvalidCharacter { position, char } => {
                write!(
                    f,
                    "Invalid character '{}' at position {}. Only letters, numbers, '_', '.' and '-' are allowed.",
                    char, position
                )
            }
        }
    }
}

impl std::error::Error for UsernameError {}

impl From<UsernameError> for Error {
    fn from(err: UsernameError) -> Self {
        Error::bad_request(err.to_string())
    }
}

/// Validate a username
pub fn validate_username(username: &str) -> Result<(), UsernameError> {
    let len = username.chars().count();

    if len < MIN_USERNAME_LEN {
        return Err(UsernameError::TooShort { min: MIN_USERNAME_LEN, got: len });
    }
    if len > MAX_USERNAME_LEN {
        return Err(UsernameError::TooLong { max: MAX_USERNAME_LEN, got: len });
    }

    for (i, c) in username.chars().enumerate() {
        if !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' | '-') {
            return Err(UsernameError::InvalidCharacter { position: i, char: c });
        }
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), Error> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_usernames() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("Alice").is_ok());
        assert!(validate_username("alice.bob").is_ok());
        assert!(validate_username("alice_bob-2").is_ok());
        assert!(validate_username("abc").is_ok());
        assert!(validate_username(&"a".repeat(40)).is_ok());
    }

    #[test]
    fn test_length_bounds() {
        assert!(matches!(
            validate_username("ab"),
            Err(UsernameError::TooShort { min: 3, got: 2 })
        ));
        assert!(matches!(
            validate_username(&"a".repeat(41)),
            Err(UsernameError::TooLong { max: 40, got: 41 })
        ));
    }

    #[test]
    fn test_invalid_characters() {
        assert!(matches!(
            validate_username("alice bob"),
            Err(UsernameError::InvalidCharacter { position: 5, char: ' ' })
        ));
        assert!(matches!(
            validate_username("alice@bob"),
            Err(UsernameError::InvalidCharacter { position: 5, char: '@' })
        ));
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("1234").is_err());
        assert!(validate_password("12345").is_ok());
        let err: Error = UsernameError::TooShort { min: 3, got: 1 }.into();
        assert_eq!(err.kind(), meshgate_common::ErrorKind::BadRequest);
    }
}
