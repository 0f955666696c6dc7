//! The entry naming grammar.

/// Names longer than this are legal but draw a warning.
pub const RECOMMENDED_NAME_LENGTH: usize = 20;

/// True when `name` is a letter followed by ASCII letters, digits or `_`,
/// optionally followed by one `.` and a non-empty extension of the same
/// characters.
pub fn is_valid_name(name: &str) -> bool {
    let (stem, extension) = match name.split_once('.') {
        Some((stem, extension)) => (stem, Some(extension)),
        None => (name, None),
    };
    let word = |s: &str| s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
    let starts_with_letter = stem.bytes().next().is_some_and(|b| b.is_ascii_alphabetic());
    starts_with_letter
        && word(stem)
        && extension.map_or(true, |ext| !ext.is_empty() && word(ext))
}

/// True for a generation folder name such as `2.2`.
pub fn is_version_name(name: &str) -> bool {
    let Some((major, minor)) = name.split_once('.') else {
        return false;
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    digits(major) && digits(minor)
}
