//! File-name validation for embedded files.

use crate::errors::StoreError;

/// Longest accepted embedded file name, in characters.
pub const MAX_FILE_NAME_LEN: usize = 255;

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '/', '\\'];

/// Check that `name` can be used as a single path component on every
/// supported platform.
///
/// Rejects empty names, path separators, characters Windows refuses in
/// file names, ASCII control characters, names that are only whitespace
/// and dots, and names longer than [`MAX_FILE_NAME_LEN`].
pub fn validate_file_name(name: &str) -> Result<(), StoreError> {
    let invalid = || StoreError::InvalidName(name.to_string());

    if name.is_empty() || name.chars().count() > MAX_FILE_NAME_LEN {
        return Err(invalid());
    }
    if name
        .chars()
        .any(|c| FORBIDDEN_CHARS.contains(&c) || (c as u32) < 0x20)
    {
        return Err(invalid());
    }

    let trimmed = name.trim().trim_matches('.');
    if trimmed.is_empty() {
        return Err(invalid());
    }
    Ok(())
}
