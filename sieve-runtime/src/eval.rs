//! Evaluates the `header`/`address`/`envelope` tests against whatever the
//! resolved match-spec operand block says to use — the
//! mirror image of `sieve-compiler`'s `emit_match_spec_block`.

use crate::address;
use crate::env::MessageData;
use crate::match_type;

/// The `(address_part, match_type, comparator)` triple the validator
/// resolves and the generator emits per match test.
/// Defaults match the validator's: `(all, is, i;ascii-casemap)`.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedMatchSpec {
    pub address_part: String,
    pub match_type: String,
    pub comparator: String,
}

impl Default for ResolvedMatchSpec {
    fn default() -> Self {
        Self {
            address_part: "all".to_string(),
            match_type: "is".to_string(),
            comparator: "i;ascii-casemap".to_string(),
        }
    }
}

/// `header`: any named header, any of its values, against any key.
pub(crate) fn evaluate_header(
    message: &dyn MessageData,
    names: &[String],
    keys: &[String],
    spec: &ResolvedMatchSpec,
) -> bool {
    if keys.is_empty() {
        return false;
    }
    names.iter().any(|name| {
        message
            .get_header(name, true)
            .iter()
            .any(|value| keys.iter().any(|key| match_type::evaluate(&spec.match_type, &spec.comparator, value, key)))
    })
}

/// `address`: like `header`, but each header value is split into a list of
/// addresses and reduced to `address_part` before comparison.
pub(crate) fn evaluate_address(
    message: &dyn MessageData,
    names: &[String],
    keys: &[String],
    spec: &ResolvedMatchSpec,
) -> bool {
    if keys.is_empty() {
        return false;
    }
    names.iter().any(|name| {
        message.get_header(name, false).iter().any(|raw| {
            address::split_address_list(raw).iter().any(|addr| {
                let part = address::extract(&spec.address_part, addr);
                keys.iter().any(|key| match_type::evaluate(&spec.match_type, &spec.comparator, &part, key))
            })
        })
    })
}

/// `envelope`: like `address`, but reads envelope fields instead of headers
/// — no address-list splitting, since `get_envelope` already
/// hands back individual addresses.
pub(crate) fn evaluate_envelope(
    message: &dyn MessageData,
    names: &[String],
    keys: &[String],
    spec: &ResolvedMatchSpec,
) -> bool {
    if keys.is_empty() {
        return false;
    }
    names.iter().any(|name| {
        message.get_envelope(name).iter().any(|raw| {
            let part = address::extract(&spec.address_part, raw);
            keys.iter().any(|key| match_type::evaluate(&spec.match_type, &spec.comparator, &part, key))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeMessage {
        headers: Vec<(&'static str, &'static str)>,
    }

    impl MessageData for FakeMessage {
        fn get_physical_size(&self) -> u64 {
            0
        }
        fn get_header(&self, name: &str, _decoded: bool) -> Vec<String> {
            self.headers
                .iter()
                .filter(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.to_string())
                .collect()
        }
        fn get_envelope(&self, _field: &str) -> Vec<String> {
            Vec::new()
        }
    }

    #[test]
    fn header_contains_matches_case_insensitively_by_default() {
        let msg = FakeMessage { headers: vec![("Subject", "Weekend SALE!!!")] };
        let spec = ResolvedMatchSpec { match_type: "contains".to_string(), ..Default::default() };
        let names = vec!["Subject".to_string()];
        let keys = vec!["sale".to_string()];
        assert!(evaluate_header(&msg, &names, &keys, &spec));
    }

    #[test]
    fn header_contains_respects_octet_comparator() {
        let msg = FakeMessage { headers: vec![("Subject", "Weekend SALE!!!")] };
        let spec = ResolvedMatchSpec {
            match_type: "contains".to_string(),
            comparator: "i;octet".to_string(),
            ..Default::default()
        };
        let names = vec!["Subject".to_string()];
        let keys = vec!["sale".to_string()];
        assert!(!evaluate_header(&msg, &names, &keys, &spec));
    }

    #[test]
    fn address_domain_is_matches_case_insensitively() {
        let msg = FakeMessage { headers: vec![("From", "x@EXAMPLE.COM")] };
        let spec = ResolvedMatchSpec { address_part: "domain".to_string(), ..Default::default() };
        let names = vec!["From".to_string()];
        let keys = vec!["example.com".to_string()];
        assert!(evaluate_address(&msg, &names, &keys, &spec));
    }
}
