//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest room code accepted on input.
pub const MAX_ROOM_CODE_LEN: usize = 8;
/// Longest player name accepted on input, in characters.
pub const MAX_PLAYER_NAME_LEN: usize = 32;
/// Name given to players who join without one.
pub const DEFAULT_PLAYER_NAME: &str = "Player";

/// Validates that a room code is 1 to 8 ASCII letters or digits, ignoring surrounding spaces.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("ABCD")   // Ok
/// validate_room_code(" abcd ") // Ok - normalized later
/// validate_room_code("AB-D")   // Err - punctuation
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if code.is_empty() || code.len() > MAX_ROOM_CODE_LEN {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be 1 to {MAX_ROOM_CODE_LEN} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates the length of a player name; blank names are allowed and defaulted.
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    let length = name.trim().chars().count();
    if length > MAX_PLAYER_NAME_LEN {
        let mut err = ValidationError::new("player_name_length");
        err.message = Some(
            format!("Player name must be at most {MAX_PLAYER_NAME_LEN} characters (got {length})")
                .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Canonical form of a room code: trimmed and uppercased.
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Trimmed display name, or [`DEFAULT_PLAYER_NAME`] when blank.
pub fn display_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_PLAYER_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_room_code_valid() {
        assert!(validate_room_code("ABCD").is_ok());
        assert!(validate_room_code("abcd").is_ok());
        assert!(validate_room_code(" XY12 ").is_ok());
    }

    #[test]
    fn test_validate_room_code_invalid_length() {
        assert!(validate_room_code("").is_err());
        assert!(validate_room_code("   ").is_err());
        assert!(validate_room_code("ABCDEFGHJ").is_err());
    }

    #[test]
    fn test_validate_room_code_invalid_format() {
        assert!(validate_room_code("AB-D").is_err());
        assert!(validate_room_code("AB D").is_err());
        assert!(validate_room_code("ÄBCD").is_err());
    }

    #[test]
    fn test_validate_player_name() {
        assert!(validate_player_name("").is_ok());
        assert!(validate_player_name("Ana").is_ok());
        assert!(validate_player_name(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_normalize_room_code() {
        assert_eq!(normalize_room_code("  abcd "), "ABCD");
    }

    #[test]
    fn test_display_name_defaults() {
        assert_eq!(display_name("   "), "Player");
        assert_eq!(display_name("  Ana "), "Ana");
    }
}
