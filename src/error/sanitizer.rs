//! Scrubs credentials and network identifiers out of error text before it
//! reaches a log line or the health metrics.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Replacement written in place of every scrubbed fragment.
pub const MASK: &str = "***";

// `scheme://user:pass@` -> `scheme://***@`
static CREDENTIALS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([a-z][a-z0-9+.\-]*://)[^\s/@:]+:[^\s/@]*@").unwrap()
});

static IPV4_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{1,3}(?:\.\d{1,3}){3}\b").unwrap());

// `user "alice"`, `for user 'alice'`, `user=`alice``
static QUOTED_USER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b((?:for\s+)?user\s*[:=]?\s*)(?:"[^"]*"|'[^']*'|`[^`]*`)"#).unwrap()
});

/// An error message that is safe to log or expose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SanitizedError {
    pub message: String,
    pub cause: Option<String>,
}

impl fmt::Display for SanitizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} (caused by: {})", self.message, cause),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Sanitize an error and its immediate source.
pub fn sanitize<E>(error: &E) -> SanitizedError
where
    E: std::error::Error + ?Sized,
{
    SanitizedError {
        message: sanitize_message(&error.to_string()),
        cause: error.source().map(|source| sanitize_message(&source.to_string())),
    }
}

/// Mask credential fragments, IPv4 addresses and quoted user names.
///
/// Patterns are applied in that order so an address embedded in a connection
/// string is still masked once the credential segment has been replaced.
pub fn sanitize_message(message: &str) -> String {
    let masked = CREDENTIALS_RE.replace_all(message, format!("${{1}}{}@", MASK).as_str());
    let masked = IPV4_RE.replace_all(&masked, MASK);
    let masked = QUOTED_USER_RE.replace_all(&masked, format!("${{1}}{}", MASK).as_str());
    masked.into_owned()
}
