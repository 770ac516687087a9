/// Name used when a title sanitizes down to nothing.
const FALLBACK_NAME: &str = "episode";

/// Longest file stem we produce, in characters. Keeps stem + extension
/// under the 255-byte limit of common filesystems for most scripts.
const MAX_STEM_CHARS: usize = 120;

/// Turns a free-form title into a single safe path component.
///
/// - Path separators, control characters and characters rejected by common
///   filesystems (`<>:"/\|?*`) become `_`
/// - Leading/trailing whitespace and dots are trimmed (no hidden files,
///   no `.` or `..`)
/// - The result is capped at a fixed number of characters
/// - An empty result becomes `"episode"`
///
/// # Examples
///
/// ```
/// use podroll::util::sanitize_filename;
///
/// assert_eq!(sanitize_filename("AC/DC: Live?"), "AC_DC_ Live_");
/// assert_eq!(sanitize_filename("   "), "episode");
/// assert_eq!(sanitize_filename(".."), "episode");
/// ```
pub fn sanitize_filename(title: &str) -> String {
    let replaced: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c.is_whitespace() || c == '.');
    let capped: String = trimmed.chars().take(MAX_STEM_CHARS).collect();
    let capped = capped.trim_end();

    if capped.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        capped.to_string()
    }
}
