//! Request pattern inspection.
//!
//! Four regex batteries evaluated case-insensitively against the query
//! string (the traversal battery also runs against the path). The first
//! match wins; no request body inspection happens here.

use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// Attack class reported by a battery match. The label feeds metrics and
/// structured logs; clients only ever see a generic 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackClass {
    Sqli,
    Xss,
    CmdInjection,
    Traversal,
}

impl AttackClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttackClass::Sqli => "sqli",
            AttackClass::Xss => "xss",
            AttackClass::CmdInjection => "cmd_injection",
            AttackClass::Traversal => "traversal",
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to compile {battery} battery: {source}")]
pub struct PatternError {
    battery: &'static str,
    #[source]
    source: regex::Error,
}

/// Compiled pattern batteries. Construction happens once at startup and a
/// compile failure is fatal to the process.
pub struct PatternEngine {
    sqli: Regex,
    xss: Regex,
    cmd_injection: Regex,
    traversal: Regex,
}

impl PatternEngine {
    pub fn new() -> Result<Self, PatternError> {
        let compile = |battery: &'static str, pattern: &str| {
            Regex::new(pattern).map_err(|source| PatternError { battery, source })
        };

        Ok(Self {
            // Tautologies, comment markers, and dangerous keywords.
            sqli: compile(
                "sqli",
                r"(?i)(union.*select|insert.*into|drop.*table|delete.*from|update.*set|' or '1'='1|--|/\*|;.*--|exec\(|sp_executesql|information_schema|sysdatabases|waitfor delay)",
            )?,
            // Script tags, event handlers, and the javascript: pseudo-protocol.
            xss: compile(
                "xss",
                r"(?i)(<script|alert\(|onerror=|onload=|onmouseover=|javascript:|eval\(|unescape\(|String\.fromCharCode|<iframe|document\.(cookie|location)|window\.(location|open)|src=.*javascript:)",
            )?,
            // Shell operators and interpreter names.
            cmd_injection: compile(
                "cmd_injection",
                r"(?i)(;|\||&&|>|<|\x60|\$\(.*\)|python|perl|bash|sh|cmd|powershell|curl|wget|nc -e|/bin/sh|/bin/bash)",
            )?,
            // Directory climbing and sensitive file probes.
            traversal: compile(
                "traversal",
                r"(?i)(\.\./|\.\.\\|/etc/passwd|/windows/system32|boot\.ini|windows/win\.ini|/var/www/html/.*\.env)",
            )?,
        })
    }

    /// Run the batteries in fixed order and return the first matching
    /// class, or `None` for a clean request.
    pub fn inspect(&self, query: &str, path: &str) -> Option<AttackClass> {
        if self.sqli.is_match(query) {
            debug!(query, "sqli battery match");
            return Some(AttackClass::Sqli);
        }
        if self.xss.is_match(query) {
            debug!(query, "xss battery match");
            return Some(AttackClass::Xss);
        }
        if self.cmd_injection.is_match(query) {
            debug!(query, "cmd injection battery match");
            return Some(AttackClass::CmdInjection);
        }
        if self.traversal.is_match(query) || self.traversal.is_match(path) {
            debug!(query, path, "traversal battery match");
            return Some(AttackClass::Traversal);
        }
        None
    }
}
