//! Verb extraction and the command naming convention.

use once_cell::sync::Lazy;
use regex::Regex;

/// Suffix appended by the naming convention.
pub const COMMAND_SUFFIX: &str = "Command";

/// Optional dotted prefix followed by a trailing word.
static VERB_PATTERN: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^(.+\.)*([A-Za-z0-9_]+)$").expect("verb pattern is valid")
});

/// Extract the verb from the path info under the mount point.
///
/// The leading slash is dropped and everything from the next `/` on is
/// discarded, so `/order.create/42` yields `order.create`. Validation happens
/// afterwards, on the truncated verb.
#[must_use]
pub fn extract_verb(path_info: &str) -> &str {
    let verb = path_info.strip_prefix('/').unwrap_or(path_info);
    match verb.find('/') {
        Some(idx) => &verb[..idx],
        None => verb,
    }
}

/// Whether `verb` matches `(prefix.)*word`.
#[must_use]
pub fn is_valid_verb(verb: &str) -> bool {
    VERB_PATTERN.is_match(verb)
}

/// Split a valid verb into its dotted prefix (including the final dot) and last word.
fn split_verb(verb: &str) -> Option<(&str, &str)> {
    if !is_valid_verb(verb) {
        return None;
    }
    Some(match verb.rfind('.') {
        Some(idx) => verb.split_at(idx + 1),
        None => ("", verb),
    })
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Candidate command identifier for `verb` under `namespace`.
///
/// `order.create` under `app.commands` becomes `app.commands.order.CreateCommand`.
/// Returns `None` when the verb does not match the verb pattern.
#[must_use]
pub fn conventional_identifier(namespace: &str, verb: &str) -> Option<String> {
    let (prefix, word) = split_verb(verb)?;
    let namespace = namespace.trim_end_matches('.');
    let mut id = String::with_capacity(namespace.len() + verb.len() + COMMAND_SUFFIX.len() + 1);
    if !namespace.is_empty() {
        id.push_str(namespace);
        id.push('.');
    }
    id.push_str(prefix);
    id.push_str(&capitalize(word));
    id.push_str(COMMAND_SUFFIX);
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_verb_truncates_at_first_slash() {
        assert_eq!(extract_verb("/login"), "login");
        assert_eq!(extract_verb("/order.create/42/x"), "order.create");
        assert_eq!(extract_verb("login"), "login");
        assert_eq!(extract_verb("/"), "");
        assert_eq!(extract_verb(""), "");
        assert_eq!(extract_verb("/../etc"), "..");
    }

    #[test]
    fn test_verb_pattern() {
        assert!(is_valid_verb("login"));
        assert!(is_valid_verb("order.create"));
        assert!(is_valid_verb("a.b.c_d9"));
        assert!(!is_valid_verb(""));
        assert!(!is_valid_verb(".."));
        assert!(!is_valid_verb("../etc"));
        assert!(!is_valid_verb(".login"));
        assert!(!is_valid_verb("order."));
        assert!(!is_valid_verb("log-in"));
    }

    #[test]
    fn test_conventional_identifier() {
        assert_eq!(
            conventional_identifier("app.commands", "login").as_deref(),
            Some("app.commands.LoginCommand")
        );
        assert_eq!(
            conventional_identifier("app.commands", "order.create").as_deref(),
            Some("app.commands.order.CreateCommand")
        );
        assert_eq!(
            conventional_identifier("app.commands.", "a.b.list").as_deref(),
            Some("app.commands.a.b.ListCommand")
        );
        assert_eq!(
            conventional_identifier("", "ping").as_deref(),
            Some("PingCommand")
        );
        assert_eq!(conventional_identifier("app", "../etc"), None);
    }
}
