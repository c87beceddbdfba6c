//! Security pattern library.
//!
//! A static table of regex heuristics. This is deliberately not a parser:
//! each entry is one case-insensitive expression matched against whole file
//! contents.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Finding severity, most severe first. The derived order is the report
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

/// One entry of the library.
#[derive(Debug)]
pub struct SecurityPattern {
    pub title: &'static str,
    pub severity: Severity,
    pub description: &'static str,
    pub recommendation: &'static str,
    pub regex: Regex,
    /// A match immediately followed by one of these (case-insensitive) is
    /// not reported.
    pub excluded_continuations: &'static [&'static str],
}

impl SecurityPattern {
    /// Whether the text right after a match rules it out.
    pub fn is_excluded(&self, rest: &str) -> bool {
        self.excluded_continuations.iter().any(|prefix| {
            rest.get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        })
    }
}

fn compile_regex(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){}", pattern))
        .unwrap_or_else(|err| panic!("invalid security pattern {pattern}: {err}"))
}

struct Entry {
    pattern: &'static str,
    title: &'static str,
    severity: Severity,
    description: &'static str,
    recommendation: &'static str,
    excluded_continuations: &'static [&'static str],
}

const ENTRIES: &[Entry] = &[
    Entry {
        pattern: r"eval\s*\(",
        title: "Unsafe eval() usage",
        severity: Severity::High,
        description: "Using eval() can execute arbitrary code and is a security risk",
        recommendation: "Use safer alternatives like JSON.parse() or Function constructor",
        excluded_continuations: &[],
    },
    Entry {
        pattern: r"innerHTML\s*=",
        title: "Potential XSS via innerHTML",
        severity: Severity::Medium,
        description: "Setting innerHTML directly can lead to Cross-Site Scripting (XSS) attacks",
        recommendation: "Use textContent or sanitize HTML before insertion",
        excluded_continuations: &[],
    },
    Entry {
        pattern: r"dangerouslySetInnerHTML",
        title: "Dangerous React HTML injection",
        severity: Severity::Medium,
        description: "dangerouslySetInnerHTML can lead to XSS if input is not sanitized",
        recommendation: "Ensure all data is properly sanitized before using",
        excluded_continuations: &[],
    },
    Entry {
        pattern: r#"(password|secret|api[_-]?key|token)\s*[:=]\s*['"][^'"]{8,}['"]"#,
        title: "Potential hardcoded secret",
        severity: Severity::Critical,
        description: "Hardcoded credentials or API keys detected in source code",
        recommendation: "Use environment variables or secret management services",
        excluded_continuations: &[],
    },
    Entry {
        pattern: r"exec\s*\(|spawn\s*\(|execSync",
        title: "Command execution",
        severity: Severity::High,
        description: "Direct command execution can lead to command injection attacks",
        recommendation: "Validate and sanitize all inputs, use parameterized commands",
        excluded_continuations: &[],
    },
    Entry {
        pattern: r"SQL.*\+.*\$|`.*SELECT.*\$|\$\{.*\}.*WHERE",
        title: "Potential SQL injection",
        severity: Severity::Critical,
        description: "String concatenation in SQL queries can lead to SQL injection",
        recommendation: "Use parameterized queries or an ORM",
        excluded_continuations: &[],
    },
    Entry {
        pattern: r"md5|sha1\s*\(",
        title: "Weak cryptographic algorithm",
        severity: Severity::Medium,
        description: "MD5 and SHA1 are considered weak for security purposes",
        recommendation: "Use SHA-256 or bcrypt for password hashing",
        excluded_continuations: &[],
    },
    Entry {
        pattern: r"cors\s*:\s*\*|Access-Control-Allow-Origin.*\*",
        title: "Permissive CORS configuration",
        severity: Severity::Medium,
        description: "Allowing all origins can expose the API to cross-origin attacks",
        recommendation: "Restrict CORS to specific trusted domains",
        excluded_continuations: &[],
    },
    Entry {
        pattern: r"http://",
        title: "Non-HTTPS URL",
        severity: Severity::Low,
        description: "Using HTTP instead of HTTPS can expose data in transit",
        recommendation: "Use HTTPS for all external communications",
        excluded_continuations: &["localhost", "127.0.0.1"],
    },
    Entry {
        pattern: r"\.env|process\.env\.[A-Z_]+",
        title: "Environment variable usage",
        severity: Severity::Info,
        description: "Environment variables detected - ensure .env files are gitignored",
        recommendation: "Verify .gitignore includes .env files",
        excluded_continuations: &[],
    },
];

/// The compiled library, in table order.
pub static PATTERNS: Lazy<Vec<SecurityPattern>> = Lazy::new(|| {
    ENTRIES
        .iter()
        .map(|e| SecurityPattern {
            title: e.title,
            severity: e.severity,
            description: e.description,
            recommendation: e.recommendation,
            regex: compile_regex(e.pattern),
            excluded_continuations: e.excluded_continuations,
        })
        .collect()
});

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(title: &str) -> &'static SecurityPattern {
        PATTERNS.iter().find(|p| p.title == title).unwrap()
    }

    #[test]
    fn test_all_patterns_compile() {
        assert_eq!(PATTERNS.len(), ENTRIES.len());
    }

    #[test]
    fn test_severity_order() {
        let mut shuffled = vec![Severity::Low, Severity::Info, Severity::Critical, Severity::Medium, Severity::High];
        shuffled.sort();
        assert_eq!(shuffled, Severity::ALL.to_vec());
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
    }

    #[test]
    fn test_patterns_case_insensitive() {
        assert!(pattern("Unsafe eval() usage").regex.is_match("EVAL (x)"));
        assert!(pattern("Potential hardcoded secret")
            .regex
            .is_match("API_KEY = 'abcdefgh1234'"));
        assert!(!pattern("Potential hardcoded secret")
            .regex
            .is_match("password = 'short'"));
    }

    #[test]
    fn test_http_exclusions() {
        let http = pattern("Non-HTTPS URL");
        assert!(http.is_excluded("localhost:3000/api"));
        assert!(http.is_excluded("127.0.0.1/"));
        assert!(http.is_excluded("LOCALHOST"));
        assert!(!http.is_excluded("example.com"));
        assert!(!http.is_excluded("local"));
    }
}
