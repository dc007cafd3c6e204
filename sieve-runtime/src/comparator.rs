//! Comparator dispatch: named equality/ordering
//! functions over strings. `i;ascii-numeric` implements RFC 4790's minimal
//! subset — a value with no leading digit is simply unequal to any value
//! that has one, never coerced to zero.

pub const OCTET: &str = "i;octet";
pub const ASCII_CASEMAP: &str = "i;ascii-casemap";
pub const ASCII_NUMERIC: &str = "i;ascii-numeric";

/// `true` if `a` and `b` are equal under `comparator`. Unrecognized
/// comparator names fall back to `i;ascii-casemap`, the engine default.
pub fn equals(comparator: &str, a: &str, b: &str) -> bool {
    match comparator {
        OCTET => a == b,
        ASCII_NUMERIC => match (numeric_prefix(a), numeric_prefix(b)) {
            (Some(x), Some(y)) => x == y,
            (None, None) => a == b,
            _ => false,
        },
        _ => a.eq_ignore_ascii_case(b),
    }
}

/// `true` if `needle` occurs anywhere in `haystack` under `comparator`. An
/// empty `needle` always matches, per RFC 5228 `:contains` semantics.
pub fn contains(comparator: &str, haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    match comparator {
        OCTET | ASCII_NUMERIC => haystack.contains(needle),
        _ => haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase()),
    }
}

fn numeric_prefix(s: &str) -> Option<u64> {
    let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octet_is_case_sensitive() {
        assert!(!equals(OCTET, "SALE", "sale"));
        assert!(equals(OCTET, "sale", "sale"));
    }

    #[test]
    fn ascii_casemap_folds_case() {
        assert!(equals(ASCII_CASEMAP, "SALE", "sale"));
    }

    #[test]
    fn ascii_numeric_compares_leading_digit_runs() {
        assert!(equals(ASCII_NUMERIC, "09", "9"));
        assert!(!equals(ASCII_NUMERIC, "9", "abc"));
    }

    #[test]
    fn contains_empty_needle_always_matches() {
        assert!(contains(OCTET, "anything", ""));
    }
}
