//! Shared-secret authentication for inbound Misskey webhooks.
//!
//! Misskey sends the secret configured on its side verbatim in the
//! `X-Misskey-Hook-Secret` header; there is no payload signature.

use crate::config::{SourceConfig, DUMMY_SECRET};
use crate::error::HookError;
use crate::registry::SourceRegistry;
use axum::http::HeaderMap;

pub const SECRET_HEADER: &str = "x-misskey-hook-secret";

/// Read the hook secret header. Empty or non-UTF-8 values count as absent.
pub fn extract_secret(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Constant-time comparison of two strings.
pub fn timing_safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Resolve `slug` and check the supplied secret against it.
///
/// A missing secret is a bad request and is checked first. Unknown slugs,
/// sources still on the placeholder secret and mismatches are all
/// `Unauthenticated`.
pub fn authenticate<'a>(
    registry: &'a SourceRegistry,
    slug: &str,
    secret: Option<&str>,
) -> Result<&'a SourceConfig, HookError> {
    let secret = match secret {
        Some(s) if !s.is_empty() => s,
        _ => return Err(HookError::MissingSecret),
    };

    let source = registry.get(slug).ok_or(HookError::Unauthenticated)?;

    if source.secret.is_empty()
        || source.secret == DUMMY_SECRET
        || !timing_safe_equal(&source.secret, secret)
    {
        return Err(HookError::Unauthenticated);
    }

    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn registry() -> SourceRegistry {
        SourceRegistry::new(vec![
            SourceConfig {
                slug: "me:me.com".to_string(),
                name: "Mine".to_string(),
                secret: "hunter2".to_string(),
                priority: 4,
            },
            SourceConfig {
                slug: "fresh".to_string(),
                name: "Fresh".to_string(),
                secret: DUMMY_SECRET.to_string(),
                priority: 4,
            },
        ])
    }

    #[test]
    fn matching_secret_authenticates() {
        let reg = registry();
        let src = authenticate(&reg, "me:me.com", Some("hunter2")).unwrap();
        assert_eq!(src.name, "Mine");
    }

    #[test]
    fn missing_secret_is_bad_request() {
        let reg = registry();
        assert!(matches!(
            authenticate(&reg, "me:me.com", None),
            Err(HookError::MissingSecret)
        ));
        assert!(matches!(
            authenticate(&reg, "me:me.com", Some("")),
            Err(HookError::MissingSecret)
        ));
        // Checked before the slug is looked at.
        assert!(matches!(
            authenticate(&reg, "nope", None),
            Err(HookError::MissingSecret)
        ));
    }

    #[test]
    fn unknown_slug_and_mismatch_look_the_same() {
        let reg = registry();
        let unknown = authenticate(&reg, "nope", Some("hunter2")).unwrap_err();
        let mismatch = authenticate(&reg, "me:me.com", Some("hunter3")).unwrap_err();
        assert!(matches!(unknown, HookError::Unauthenticated));
        assert!(matches!(mismatch, HookError::Unauthenticated));
        assert_eq!(unknown.to_string(), mismatch.to_string());
    }

    #[test]
    fn placeholder_secret_never_authenticates() {
        let reg = registry();
        assert!(matches!(
            authenticate(&reg, "fresh", Some(DUMMY_SECRET)),
            Err(HookError::Unauthenticated)
        ));
    }

    #[test]
    fn secret_comparison_is_exact() {
        let reg = registry();
        for attempt in ["Hunter2", "hunter2 ", " hunter2", "hunter"] {
            assert!(authenticate(&reg, "me:me.com", Some(attempt)).is_err());
        }
    }

    #[test]
    fn test_timing_safe_equal() {
        assert!(timing_safe_equal("secret", "secret"));
        assert!(!timing_safe_equal("secret", "secret1"));
        assert!(!timing_safe_equal("secret", "SECRET"));
        assert!(timing_safe_equal("", ""));
    }

    #[test]
    fn header_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_secret(&headers), None);

        headers.insert("X-Misskey-Hook-Secret", HeaderValue::from_static(""));
        assert_eq!(extract_secret(&headers), None);

        headers.insert("X-Misskey-Hook-Secret", HeaderValue::from_static("abc"));
        assert_eq!(extract_secret(&headers), Some("abc"));
    }
}
