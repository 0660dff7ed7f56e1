//! Reply post-processing
//!
//! Models frequently wrap the requested reply in boilerplate ("Here is a
//! reply:", quotes, a trailing sign-off). This is a pure string transform
//! applied uniformly to every generated reply regardless of backend.

/// Preamble phrases stripped when they lead the reply (case-insensitive)
const PREAMBLE_PATTERNS: [&str; 8] = [
    "here is a reply:",
    "here is a possible reply:",
    "here's a reply:",
    "here's a possible reply:",
    "sure, here's a reply:",
    "sure! here's a reply:",
    "reply:",
    "response:",
];

/// Strip known boilerplate preambles and wrapping quotes
pub fn clean_reply(text: &str) -> String {
    let mut cleaned = text.trim();

    for pattern in &PREAMBLE_PATTERNS {
        if cleaned.len() >= pattern.len()
            && cleaned.is_char_boundary(pattern.len())
            && cleaned[..pattern.len()].eq_ignore_ascii_case(pattern)
        {
            cleaned = cleaned[pattern.len()..].trim_start();
            break;
        }
    }

    // Drop a symmetric wrapping quote pair
    let cleaned = cleaned.trim();
    let stripped = if (cleaned.starts_with('"') && cleaned.ends_with('"') && cleaned.len() >= 2)
        || (cleaned.starts_with('\u{201c}') && cleaned.ends_with('\u{201d}'))
    {
        let mut chars = cleaned.chars();
        chars.next();
        chars.next_back();
        chars.as_str().trim()
    } else {
        cleaned
    };

    stripped.to_string()
}
