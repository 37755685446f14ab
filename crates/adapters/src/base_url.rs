use regex::Regex;
use std::sync::OnceLock;

fn version_suffix_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"/v\d+$").expect("invalid version suffix regex"))
}

/// Normalizes an OpenAI-compatible base URL: appends `/v1` unless a version
/// segment is already present. A trailing `#` opts out of the rewrite and is
/// stripped.
pub fn check_base_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if trimmed.ends_with('#') {
        return trimmed.trim_end_matches('#').to_string();
    }

    let without_slash = trimmed.trim_end_matches('/');
    if version_suffix_regex().is_match(without_slash) || without_slash.contains("/v1/") {
        without_slash.to_string()
    } else {
        format!("{without_slash}/v1")
    }
}

/// Uses `configured` when set, otherwise the provider default, then
/// normalizes the result.
pub fn resolve_base_url(configured: &str, default: &str) -> String {
    if configured.trim().is_empty() {
        check_base_url(default)
    } else {
        check_base_url(configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_base_url_appends_v1_when_missing() {
        assert_eq!(check_base_url("https://example.com"), "https://example.com/v1");
        assert_eq!(check_base_url("https://example.com/"), "https://example.com/v1");
    }

    #[test]
    fn check_base_url_keeps_existing_version() {
        assert_eq!(check_base_url("https://example.com/v2"), "https://example.com/v2");
        assert_eq!(check_base_url("https://example.com/v1/"), "https://example.com/v1");
    }

    #[test]
    fn check_base_url_respects_hash_suffix() {
        assert_eq!(check_base_url("https://example.com/api#"), "https://example.com/api");
    }

    #[test]
    fn empty_configuration_uses_the_default() {
        assert_eq!(
            resolve_base_url("  ", "https://api.deepseek.com"),
            "https://api.deepseek.com/v1"
        );
        assert_eq!(
            resolve_base_url("http://gateway.local/openai", "https://api.openai.com/v1"),
            "http://gateway.local/openai/v1"
        );
    }
}
