//! Normalization and comparison rules used by the assignment and enrollment
//! engines. Matching is deliberately forgiving about surface form: section
//! lists compare as sets, usernames compare case-insensitively, and semester
//! tokens may carry ordinal suffixes ("3rd" matches semester 3).

/// Strip an ordinal suffix from a semester token: "1st" -> 1, "2nd" -> 2,
/// "3rd" -> 3, "4th" -> 4, plain "3" -> 3. Returns None for anything that
/// does not start with digits in 1..=8.
pub fn normalize_semester(token: &str) -> Option<i64> {
    let t = token.trim();
    let digits: String = t.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let rest = &t[digits.len()..];
    match rest.to_ascii_lowercase().as_str() {
        "" | "st" | "nd" | "rd" | "th" => {}
        _ => return None,
    }
    let n: i64 = digits.parse().ok()?;
    if (1..=8).contains(&n) {
        Some(n)
    } else {
        None
    }
}

/// Case-normalized form used wherever credential usernames are compared.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_ascii_lowercase()
}

pub fn username_eq(a: &str, b: &str) -> bool {
    normalize_username(a) == normalize_username(b)
}

/// Parse a comma-delimited section list into a trimmed, deduplicated,
/// upper-cased list. Input order is preserved for the first occurrence of
/// each code; empty segments are dropped.
pub fn parse_section_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split(',') {
        let code = part.trim().to_ascii_uppercase();
        if code.is_empty() || out.iter().any(|c| c == &code) {
            continue;
        }
        out.push(code);
    }
    out
}

/// Set equality over section lists, ignoring order and duplicates.
pub fn section_sets_equal(a: &[String], b: &[String]) -> bool {
    section_set_covers(a, b) && section_set_covers(b, a)
}

/// True when every section in `needles` appears in `haystack`.
pub fn section_set_covers(haystack: &[String], needles: &[String]) -> bool {
    needles.iter().all(|n| haystack.iter().any(|h| h == n))
}
