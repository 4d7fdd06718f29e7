//! Firewall rule compilation and first-match evaluation.
//!
//! Rules are stored as raw strings, either a bare pattern (matched
//! case-insensitively) or a delimited `/pattern/flags` form carrying its own
//! flags. Evaluation walks the rule list in store order and stops at the
//! first match. A rule that fails to compile is skipped with a warning and
//! never aborts evaluation of the remaining rules.

use regex::{Regex, RegexBuilder};
use tracing::warn;

/// Response text returned for a blocked command. Blocked forensic records
/// carry this sentinel instead of generated output.
pub const BLOCKED_RESPONSE: &str = "FIREWALL BLOCKED: malicious payload detected";

/// Firewall decision for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The command matched an active rule; the raw rule text is reported.
    Blocked { rule: String },
    Allowed,
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Blocked { .. })
    }
}

/// Evaluate a command against the active rule list, first match wins.
///
/// Deterministic for a fixed rule list and command. Malformed rules are
/// skipped; evaluation always terminates with a definite verdict.
pub fn evaluate(command: &str, rules: &[String]) -> Verdict {
    for raw in rules {
        let regex = match compile_rule(raw) {
            Ok(r) => r,
            Err(err) => {
                warn!(rule = %raw, error = %err, "skipping malformed firewall rule");
                continue;
            }
        };
        if regex.is_match(command) {
            return Verdict::Blocked { rule: raw.clone() };
        }
    }
    Verdict::Allowed
}

/// Compile a stored rule into a regex.
///
/// A bare pattern is compiled case-insensitively. A `/pattern/flags` form
/// uses the embedded flags instead: `i` (case-insensitive), `m`
/// (multi-line), `s` (dot matches newline); other flag letters are ignored.
/// `/pattern/` with no flags keeps the case-insensitive default.
pub fn compile_rule(raw: &str) -> Result<Regex, regex::Error> {
    let (pattern, flags) = split_delimited(raw);
    RegexBuilder::new(pattern)
        .case_insensitive(flags.map_or(true, |f| f.is_empty() || f.contains('i')))
        .multi_line(flags.is_some_and(|f| f.contains('m')))
        .dot_matches_new_line(flags.is_some_and(|f| f.contains('s')))
        .build()
}

/// Split a `/pattern/flags` rule into its body and flags. Returns the raw
/// string unchanged (no flags) when it is not in delimited form.
fn split_delimited(raw: &str) -> (&str, Option<&str>) {
    if let Some(rest) = raw.strip_prefix('/') {
        if let Some(idx) = rest.rfind('/') {
            let (pattern, flags) = (&rest[..idx], &rest[idx + 1..]);
            if flags.chars().all(|c| c.is_ascii_lowercase()) {
                return (pattern, Some(flags));
            }
        }
    }
    (raw, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rule_set_allows() {
        assert_eq!(evaluate("DROP TABLE users", &[]), Verdict::Allowed);
    }

    #[test]
    fn first_match_wins() {
        let rules = vec!["union".to_string(), "select".to_string()];
        match evaluate("UNION SELECT 1,2,3", &rules) {
            Verdict::Blocked { rule } => assert_eq!(rule, "union"),
            Verdict::Allowed => panic!("expected block"),
        }
    }

    #[test]
    fn bare_pattern_is_case_insensitive() {
        let rules = vec!["union\\s+select".to_string()];
        assert!(evaluate("UNION   SELECT * FROM users", &rules).is_blocked());
        assert!(evaluate("union select 1", &rules).is_blocked());
    }

    #[test]
    fn delimited_rule_with_embedded_flags() {
        let rules = vec!["/(union\\s+select|benchmark|sleep)/i".to_string()];
        assert!(evaluate("1 UNION SELECT password FROM users", &rules).is_blocked());
        assert!(!evaluate("hello world", &rules).is_blocked());
    }

    #[test]
    fn delimited_rule_without_flags_stays_case_insensitive() {
        let rules = vec!["/drop table/".to_string()];
        assert!(evaluate("DROP TABLE users", &rules).is_blocked());
    }

    #[test]
    fn delimited_rule_without_i_flag_is_case_sensitive() {
        let rules = vec!["/drop table/m".to_string()];
        assert!(!evaluate("DROP TABLE users", &rules).is_blocked());
        assert!(evaluate("drop table users", &rules).is_blocked());
    }

    #[test]
    fn pattern_with_internal_slashes() {
        // rfind keeps the body intact when the pattern itself contains '/'.
        let rules = vec!["/etc/passwd/".to_string()];
        assert!(evaluate("; cat /etc/passwd", &rules).is_blocked());
    }

    #[test]
    fn malformed_rule_is_skipped() {
        let rules = vec!["[invalid".to_string(), "select".to_string()];
        assert!(evaluate("SELECT * FROM users", &rules).is_blocked());
    }

    #[test]
    fn all_rules_malformed_still_terminates() {
        let rules = vec!["[a".to_string(), "(b".to_string(), "*c".to_string()];
        assert_eq!(evaluate("anything at all", &rules), Verdict::Allowed);
    }

    #[test]
    fn no_match_reports_allowed() {
        let rules = vec!["union".to_string()];
        assert_eq!(evaluate("hello", &rules), Verdict::Allowed);
    }

    #[test]
    fn compile_rule_rejects_invalid() {
        assert!(compile_rule("[invalid").is_err());
    }
}
