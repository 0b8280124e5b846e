//! URL helpers for building gateway endpoints.

/// Normalize a base URL by removing trailing slashes.
///
/// ```
/// use dramatis::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://openrouter.ai/api/v1/"), "https://openrouter.ai/api/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path without producing double slashes.
///
/// ```
/// use dramatis::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://openrouter.ai/api/v1/", "chat/completions"),
///     "https://openrouter.ai/api/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_trimmed() {
        assert_eq!(
            normalize_base_url("https://openrouter.ai/api/v1///"),
            "https://openrouter.ai/api/v1"
        );
        assert_eq!(normalize_base_url(""), "");
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn endpoint_join_never_doubles_slashes() {
        assert_eq!(
            construct_api_url("https://openrouter.ai/api/v1", "models"),
            "https://openrouter.ai/api/v1/models"
        );
        assert_eq!(
            construct_api_url("https://openrouter.ai/api/v1/", "/models"),
            "https://openrouter.ai/api/v1/models"
        );
        assert_eq!(
            construct_api_url("https://openrouter.ai/api/v1///", "///chat/completions"),
            "https://openrouter.ai/api/v1/chat/completions"
        );
    }
}
