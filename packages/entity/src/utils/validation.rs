/// Maximum length of a chat message body, in characters, after trimming
pub const MESSAGE_BODY_MAX_CHARS: usize = 1000;

/// Maximum length of a study room name, in characters, after trimming
pub const ROOM_NAME_MAX_CHARS: usize = 100;

/// Maximum length of a study room description, in characters, after trimming
pub const ROOM_DESCRIPTION_MAX_CHARS: usize = 500;

/// Caller-correctable input error.
///
/// Never retried; surfaced to the presentation layer as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Validation error for {field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

/// Trims `value` and checks its character count lies within `min..=max`.
///
/// Returns the trimmed value on success.
pub fn trimmed_within<'a>(
    field: &'static str,
    value: &'a str,
    min: usize,
    max: usize,
) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();

    if len < min {
        return Err(if min == 1 {
            ValidationError::new(field, "cannot be empty")
        } else {
            ValidationError::new(field, format!("is too short (min {min} characters)"))
        });
    }

    if len > max {
        return Err(ValidationError::new(field, format!("is too long (max {max} characters)")));
    }

    Ok(trimmed)
}

/// Validates a chat message body: 1..=1000 characters once trimmed.
pub fn validate_message_body(body: &str) -> Result<&str, ValidationError> {
    trimmed_within("body", body, 1, MESSAGE_BODY_MAX_CHARS)
}

/// Validates a study room name: 1..=100 characters once trimmed.
pub fn validate_room_name(name: &str) -> Result<&str, ValidationError> {
    trimmed_within("name", name, 1, ROOM_NAME_MAX_CHARS)
}

/// Validates an optional room description. Blank descriptions collapse to `None`.
pub fn validate_room_description(
    description: Option<&str>,
) -> Result<Option<&str>, ValidationError> {
    match description {
        None => Ok(None),
        Some(text) => {
            let trimmed = trimmed_within("description", text, 0, ROOM_DESCRIPTION_MAX_CHARS)?;
            Ok((!trimmed.is_empty()).then_some(trimmed))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_body_bounds() {
        assert!(validate_message_body("").is_err());
        assert!(validate_message_body("   \n\t").is_err());
        assert_eq!(validate_message_body("  Hello  ").unwrap(), "Hello");

        let max = "a".repeat(MESSAGE_BODY_MAX_CHARS);
        assert!(validate_message_body(&max).is_ok());

        let over = "a".repeat(MESSAGE_BODY_MAX_CHARS + 1);
        let err = validate_message_body(&over).unwrap_err();
        assert_eq!(err.field, "body");
    }

    #[test]
    fn message_body_counts_chars_not_bytes() {
        // 1000 multi-byte characters are still within bounds
        let body = "é".repeat(MESSAGE_BODY_MAX_CHARS);
        assert!(body.len() > MESSAGE_BODY_MAX_CHARS);
        assert!(validate_message_body(&body).is_ok());
    }

    #[test]
    fn room_description_blank_is_none() {
        assert_eq!(validate_room_description(None).unwrap(), None);
        assert_eq!(validate_room_description(Some("   ")).unwrap(), None);
        assert_eq!(validate_room_description(Some(" chapter 5 ")).unwrap(), Some("chapter 5"));
        assert!(validate_room_description(Some(&"x".repeat(501))).is_err());
    }

    #[test]
    fn room_name_bounds() {
        assert!(validate_room_name(" ").is_err());
        assert!(validate_room_name(&"n".repeat(ROOM_NAME_MAX_CHARS + 1)).is_err());
        assert_eq!(validate_room_name(" Math 101 ").unwrap(), "Math 101");
    }
}
