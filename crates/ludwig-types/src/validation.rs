use snafu::Snafu;

use crate::constants::{THREAD_TITLE_MAX_BYTES, THREAD_URL_MAX_BYTES};

#[derive(Debug, Snafu)]
pub enum ValidationError {
    #[snafu(display("name must match [A-Za-z0-9_]{{1,64}}"))]
    InvalidName,
    #[snafu(display("title too long: {len} bytes (max {THREAD_TITLE_MAX_BYTES})"))]
    TitleTooLong { len: usize },
    #[snafu(display("content too long: {len} bytes (max {max})"))]
    ContentTooLong { len: usize, max: usize },
    #[snafu(display("url too long: {len} bytes (max {THREAD_URL_MAX_BYTES})"))]
    UrlTooLong { len: usize },
    #[snafu(display("content must not be empty"))]
    EmptyContent,
}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// `[A-Za-z0-9_]{1,64}`, used for both usernames and board names (spec
/// testable property 14).
pub fn validate_name(name: &str) -> ValidationResult<()> {
    if name.is_empty()
        || name.len() > 64
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
        return InvalidNameSnafu.fail();
    }
    Ok(())
}

pub fn validate_title(title: &str) -> ValidationResult<()> {
    if title.len() > THREAD_TITLE_MAX_BYTES {
        return TitleTooLongSnafu { len: title.len() }.fail();
    }
    Ok(())
}

pub fn validate_content_url(url: &str) -> ValidationResult<()> {
    if url.len() > THREAD_URL_MAX_BYTES {
        return UrlTooLongSnafu { len: url.len() }.fail();
    }
    Ok(())
}

/// Shared by thread `content_text` and comment `content`; `max` is the
/// site-configured `post_max_length` setting.
pub fn validate_post_content(content: &str, max: usize, allow_empty: bool) -> ValidationResult<()> {
    if !allow_empty && content.is_empty() {
        return EmptyContentSnafu.fail();
    }
    if content.len() > max {
        return ContentTooLongSnafu {
            len: content.len(),
            max,
        }
        .fail();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_names() {
        assert!(validate_name("alice_99").is_ok());
        assert!(validate_name("a").is_ok());
        assert!(validate_name(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name(&"a".repeat(65)).is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name("has-dash").is_err());
        assert!(validate_name("héllo").is_err());
    }

    #[test]
    fn comment_content_rejects_empty() {
        assert!(validate_post_content("", 100, false).is_err());
        assert!(validate_post_content("hi", 100, false).is_ok());
    }

    #[test]
    fn thread_content_text_allows_empty_for_link_posts() {
        assert!(validate_post_content("", 100, true).is_ok());
    }
}
