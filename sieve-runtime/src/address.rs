//! Address-part extraction: `:localpart`/`:domain`/`:all` of an
//! address, plus minimal `"Display Name" <addr>` / comma-list unwrapping,
//! since the script-environment interface hands back raw header text, not
//! a pre-parsed address list.

/// Extracts `address_part` from a bare mailbox address. Unrecognized parts
/// fall back to `all`.
pub fn extract(address_part: &str, address: &str) -> String {
    match address_part {
        "localpart" => address.split('@').next().unwrap_or("").to_string(),
        "domain" => address.split_once('@').map(|(_, d)| d.to_string()).unwrap_or_default(),
        _ => address.to_string(),
    }
}

/// Splits a raw header value like `"A <a@x>, b@y"` into individual mailbox
/// strings, unwrapping the `<...>` form where present.
pub fn split_address_list(raw: &str) -> Vec<String> {
    raw.split(',').map(parse_mailbox).filter(|s| !s.is_empty()).collect()
}

fn parse_mailbox(raw: &str) -> String {
    if let Some(start) = raw.find('<') {
        if let Some(end) = raw[start + 1..].find('>') {
            return raw[start + 1..start + 1 + end].trim().to_string();
        }
    }
    raw.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_localpart_and_domain() {
        assert_eq!(extract("localpart", "user@example.com"), "user");
        assert_eq!(extract("domain", "user@example.com"), "example.com");
        assert_eq!(extract("all", "user@example.com"), "user@example.com");
    }

    #[test]
    fn bare_mailbox_has_no_domain() {
        assert_eq!(extract("domain", "not-an-address"), "");
    }

    #[test]
    fn splits_display_name_address_lists() {
        let got = split_address_list(r#"Alice <a@example.com>, b@example.org"#);
        assert_eq!(got, vec!["a@example.com".to_string(), "b@example.org".to_string()]);
    }
}
