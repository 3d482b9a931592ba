//! Shared utility functions used across multiple modules.

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Swap an `http(s)://` base URL for its `ws(s)://` counterpart.
pub fn websocket_base_url(http_url: &str) -> Option<String> {
    if let Some(rest) = http_url.strip_prefix("https://") {
        Some(format!("wss://{rest}"))
    } else {
        http_url
            .strip_prefix("http://")
            .map(|rest| format!("ws://{rest}"))
    }
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" https://demo.supabase.co ".to_string())),
            Some("https://demo.supabase.co".to_string())
        );
    }

    #[test]
    fn websocket_base_url_maps_schemes() {
        assert_eq!(
            websocket_base_url("https://demo.supabase.co").as_deref(),
            Some("wss://demo.supabase.co")
        );
        assert_eq!(
            websocket_base_url("http://localhost:54321").as_deref(),
            Some("ws://localhost:54321")
        );
        assert_eq!(websocket_base_url("demo.supabase.co"), None);
    }

    #[test]
    fn compact_text_limits_length() {
        let long = "x".repeat(500);
        assert_eq!(compact_text(&long).len(), 180);
        assert_eq!(compact_text("  short  "), "short");
    }
}
