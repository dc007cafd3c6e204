//! Match-type dispatch: how a header/address/envelope value is
//! compared against a key. `:matches` implements the RFC 5228 glob subset
//! (`*` runs of any characters, `?` exactly one).

use crate::comparator;

/// Evaluates `value` against `key` under `match_type`/`comparator`.
/// Unrecognized match-types fall back to `is`.
pub fn evaluate(match_type: &str, comparator_name: &str, value: &str, key: &str) -> bool {
    match match_type {
        "contains" => comparator::contains(comparator_name, value, key),
        "matches" => glob_match(comparator_name, value, key),
        _ => comparator::equals(comparator_name, value, key),
    }
}

fn glob_match(comparator_name: &str, value: &str, pattern: &str) -> bool {
    let fold = comparator_name != comparator::OCTET;
    let value: Vec<char> = fold_chars(value, fold);
    let pattern: Vec<char> = fold_chars(pattern, fold);
    glob_match_chars(&value, &pattern)
}

fn fold_chars(s: &str, fold: bool) -> Vec<char> {
    if fold {
        s.to_ascii_lowercase().chars().collect()
    } else {
        s.chars().collect()
    }
}

fn glob_match_chars(value: &[char], pattern: &[char]) -> bool {
    match pattern.first() {
        None => value.is_empty(),
        Some('*') => {
            glob_match_chars(value, &pattern[1..])
                || (!value.is_empty() && glob_match_chars(&value[1..], pattern))
        }
        Some('?') => !value.is_empty() && glob_match_chars(&value[1..], &pattern[1..]),
        Some(c) => value.first() == Some(c) && glob_match_chars(&value[1..], &pattern[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_requires_exact_equality() {
        assert!(evaluate("is", comparator::ASCII_CASEMAP, "INBOX", "inbox"));
        assert!(!evaluate("is", comparator::ASCII_CASEMAP, "INBOX2", "inbox"));
    }

    #[test]
    fn contains_is_substring() {
        assert!(evaluate("contains", comparator::ASCII_CASEMAP, "Weekend SALE!!!", "sale"));
    }

    #[test]
    fn matches_supports_star_and_question_mark() {
        assert!(evaluate("matches", comparator::ASCII_CASEMAP, "example.com", "*.com"));
        assert!(evaluate("matches", comparator::ASCII_CASEMAP, "ab", "?b"));
        assert!(!evaluate("matches", comparator::ASCII_CASEMAP, "abc", "?b"));
    }

    #[test]
    fn matches_is_case_sensitive_under_octet() {
        assert!(!evaluate("matches", comparator::OCTET, "EXAMPLE.com", "example*"));
    }
}
