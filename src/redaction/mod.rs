//! Secret redaction.
//!
//! Scrubs recognizable credentials from text before it reaches a model, and
//! flags file names that conventionally hold secrets. Each match becomes
//! `[REDACTED:<pattern>:<first four chars>***]`, enough to recognize what was
//! there without being able to reconstruct it.

use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

/// Named secret patterns, applied in order. All are case-insensitive.
const PATTERNS: &[(&str, &str)] = &[
    (
        "api_key",
        r#"(?:api[_-]?key|apikey)\s*[=:]\s*["']?([a-zA-Z0-9_\-]{20,})["']?"#,
    ),
    ("bearer_token", r"Bearer\s+([a-zA-Z0-9_\-\.]{20,})"),
    (
        "auth_token",
        r#"(?:auth[_-]?token|token)\s*[=:]\s*["']?([a-zA-Z0-9_\-]{20,})["']?"#,
    ),
    ("aws_access_key", r"(?:AKIA|ABIA|ACCA|ASIA)[A-Z0-9]{16}"),
    (
        "aws_secret_key",
        r#"(?:aws[_-]?secret[_-]?(?:access[_-]?)?key)\s*[=:]\s*["']?([a-zA-Z0-9/+=]{40})["']?"#,
    ),
    ("github_token", r"gh[pousr]_[A-Za-z0-9_]{36,}"),
    ("github_pat", r"github_pat_[A-Za-z0-9_]{22,}"),
    ("polar_token", r"polar_(?:live|test)_[a-zA-Z0-9]{24,}"),
    (
        "db_url",
        r"(?:mysql|postgres|mongodb|redis)://[^@\s]+:[^@\s]+@[^\s]+",
    ),
    (
        "private_key",
        r"-----BEGIN (?:RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----",
    ),
    (
        "password_config",
        r#"(?:password|passwd|pwd)\s*[=:]\s*["']?([^\s"']{8,})["']?"#,
    ),
    ("jwt", r"eyJ[a-zA-Z0-9_-]*\.eyJ[a-zA-Z0-9_-]*\.[a-zA-Z0-9_-]*"),
    (
        "secret",
        r#"(?:secret|client[_-]?secret)\s*[=:]\s*["']?([a-zA-Z0-9_\-]{16,})["']?"#,
    ),
    ("slack_token", r"xox[baprs]-[a-zA-Z0-9-]+"),
    ("sendgrid_key", r"SG\.[a-zA-Z0-9_-]{22,}\.[a-zA-Z0-9_-]{43,}"),
    ("twilio_key", r"SK[a-f0-9]{32}"),
];

/// File names that conventionally hold secrets, compared case-insensitively.
const SENSITIVE_FILES: &[&str] = &[
    ".env",
    ".env.local",
    ".env.production",
    ".env.staging",
    ".env.development",
    "credentials.json",
    "service-account.json",
    "secrets.yaml",
    "secrets.yml",
    ".npmrc",
    ".pypirc",
    "id_rsa",
    "id_ed25519",
    ".htpasswd",
];

/// Prefix shared by environment files (`.env.test`, `.envrc`, ...).
const ENV_FILE_PREFIX: &str = ".env";

/// Characters of the original match kept in the marker.
const PREFIX_CHARS: usize = 4;

static DEFAULT_REDACTOR: LazyLock<SecretRedactor> = LazyLock::new(SecretRedactor::new);

struct NamedPattern {
    name: &'static str,
    regex: Regex,
}

/// Ordered table of compiled secret patterns.
pub struct SecretRedactor {
    patterns: Vec<NamedPattern>,
}

impl SecretRedactor {
    pub fn new() -> Self {
        let patterns = PATTERNS
            .iter()
            .filter_map(|&(name, pattern)| {
                Regex::new(&format!("(?i){}", pattern))
                    .ok()
                    .map(|regex| NamedPattern { name, regex })
            })
            .collect();
        Self { patterns }
    }

    /// Names of the active patterns in application order.
    pub fn pattern_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.patterns.iter().map(|p| p.name)
    }

    /// Replace every secret in `text`.
    pub fn redact(&self, text: &str) -> String {
        self.redact_counted(text).0
    }

    /// Replace every secret in `text` and report how many were replaced.
    pub fn redact_counted(&self, text: &str) -> (String, usize) {
        let mut output = text.to_string();
        let mut count = 0;

        for pattern in &self.patterns {
            let hits = pattern.regex.find_iter(&output).count();
            if hits == 0 {
                continue;
            }
            count += hits;
            output = pattern
                .regex
                .replace_all(&output, |caps: &Captures| marker(pattern.name, &caps[0]))
                .into_owned();
        }

        (output, count)
    }
}

impl Default for SecretRedactor {
    fn default() -> Self {
        Self::new()
    }
}

fn marker(name: &str, matched: &str) -> String {
    let prefix: String = matched.chars().take(PREFIX_CHARS).collect();
    format!("[REDACTED:{}:{}***]", name, prefix)
}

/// Redact `text` with the built-in pattern table.
pub fn redact(text: &str) -> String {
    DEFAULT_REDACTOR.redact(text)
}

/// Redact `text` with the built-in pattern table, counting replacements.
pub fn redact_counted(text: &str) -> (String, usize) {
    DEFAULT_REDACTOR.redact_counted(text)
}

/// True when the base name of `path` is a known secret-bearing file.
pub fn is_sensitive_file(path: &str) -> bool {
    let Some(name) = Path::new(path).file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_lowercase();

    name.starts_with(ENV_FILE_PREFIX) || SENSITIVE_FILES.iter().any(|f| *f == name)
}
