/// Keep only ASCII digits, `.` and `-`.
pub fn strip_non_numeric(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect()
}

/// Best-effort numeric coercion: strip everything but digits, `.` and `-`,
/// then parse. Returns `None` when nothing parseable remains.
pub fn coerce_number(raw: &str) -> Option<f64> {
    let stripped = strip_non_numeric(raw);
    if stripped.is_empty() {
        return None;
    }
    stripped.parse::<f64>().ok()
}
