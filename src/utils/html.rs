use ammonia;

/// Strips unsafe markup from teacher-supplied quiz text.
///
/// Whitelist-based: safe tags like <b> survive, <script> and event handler
/// attributes are removed.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Trims and sanitizes optional free text, mapping blanks to `None`.
pub fn clean_optional(input: Option<&str>) -> Option<String> {
    input
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(clean_html)
}
