//! Small AST-reading helpers shared between the validator and the
//! generator, so both walk tag/positional/test-tree shapes the same way.

use sieve_syntax::{Argument, ArgumentValue, MatchSpec, Test};

/// Positional arguments, skipping tags and — for `:comparator`, whose
/// grammar production is `":comparator" string` — the string immediately
/// following it.
pub(crate) fn effective_positionals(args: &[Argument]) -> Vec<&Argument> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].tag_name() {
            Some("comparator") => i += 2,
            Some(_) => i += 1,
            None => {
                out.push(&args[i]);
                i += 1;
            }
        }
    }
    out
}

pub(crate) fn single_test_arg(args: &[Argument]) -> Option<&Test> {
    args.iter().find_map(|a| match &a.value {
        ArgumentValue::Test(t) => Some(t.as_ref()),
        _ => None,
    })
}

pub(crate) fn test_list_arg(args: &[Argument]) -> Option<&[Test]> {
    args.iter().find_map(|a| match &a.value {
        ArgumentValue::TestList(list) => Some(list.as_slice()),
        _ => None,
    })
}

pub(crate) fn flatten_strings(args: &[Argument]) -> Vec<(String, sieve_core::Location)> {
    let mut out = Vec::new();
    for a in args {
        match &a.value {
            ArgumentValue::String(s) => out.push((s.clone(), a.location.clone())),
            ArgumentValue::StringList(list) => {
                out.extend(list.iter().map(|s| (s.clone(), a.location.clone())))
            }
            _ => {}
        }
    }
    out
}

/// Resolves the `(address-part, match-type, comparator)` triple from a
/// `header`/`address`/`envelope` test's raw tag arguments, defaulting any
/// unspecified one to `all`, `is`, `i;ascii-casemap`.
pub(crate) fn resolve_match_spec(args: &[Argument]) -> MatchSpec {
    let mut spec = MatchSpec::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].tag_name() {
            Some("is") => spec.match_type = "is".into(),
            Some("contains") => spec.match_type = "contains".into(),
            Some("matches") => spec.match_type = "matches".into(),
            Some("localpart") => spec.address_part = "localpart".into(),
            Some("domain") => spec.address_part = "domain".into(),
            Some("all") => spec.address_part = "all".into(),
            Some("comparator") => {
                if let Some(value) = args.get(i + 1).and_then(Argument::as_single_string) {
                    spec.comparator = value.to_string();
                }
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    spec
}
