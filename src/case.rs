//! Case normalization for request keys: camelCase and UPPERCASE segments fold to snake_case.

/// Convert a single identifier from camelCase to snake_case.
/// e.g. "openingHours" -> "opening_hours", "createdAt" -> "created_at"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Normalize one path segment. All-caps segments ("NAME") are only lower-cased.
pub fn normalize_segment(segment: &str) -> String {
    let segment = segment.trim();
    if segment.chars().any(char::is_lowercase) {
        to_snake_case(segment)
    } else {
        segment.to_lowercase()
    }
}

/// Normalize every segment of a dotted key.
pub fn normalize_key(key: &str) -> String {
    key.split('.').map(normalize_segment).collect::<Vec<_>>().join(".")
}
