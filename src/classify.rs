//! Severity heuristics for raw log lines.
//!
//! Patterns are tried in a fixed order (error, warn, debug) and the first hit wins,
//! so a line mentioning both "warn" and "error" is an error. Lines that match
//! nothing are `info`. Word boundaries are ASCII-only, so a keyword glued to a
//! non-ASCII letter still counts as a word.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::output::{sanitize_text, LogLevel};

struct Rules {
    error: Vec<Regex>,
    warn: Vec<Regex>,
    debug: Vec<Regex>,
}

static RULES: Lazy<Rules> = Lazy::new(|| Rules {
    error: compile(&[
        r"(?i)(?-u:\b)error(?-u:\b)",
        r"(?i)(?-u:\b)fatal(?-u:\b)",
        r"(?i)(?-u:\b)exception(?-u:\b)",
        r"(?i)(?-u:\b)failed(?-u:\b)",
        r"(?-u:\b)ERR[!_]",
        r"^\s*Error:",
        r"^\s*TypeError:",
        r"^\s*ReferenceError:",
        r"^\s*SyntaxError:",
    ]),
    warn: compile(&[
        r"(?i)(?-u:\b)warn(ing)?(?-u:\b)",
        r"(?-u:\b)WARN[!_]",
        r"(?i)(?-u:\b)deprecated(?-u:\b)",
    ]),
    debug: compile(&[
        r"(?i)(?-u:\b)debug(?-u:\b)",
        r"(?-u:\b)DEBUG[_:]",
        r"(?i)(?-u:\b)trace(?-u:\b)",
        r"(?i)(?-u:\b)verbose(?-u:\b)",
    ]),
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
}

/// Classifies a raw line, stripping terminal escape sequences first.
pub fn classify(line: &str) -> LogLevel {
    classify_plain(&sanitize_text(line))
}

fn classify_plain(line: &str) -> LogLevel {
    let rules = &*RULES;
    let hit = |set: &[Regex]| set.iter().any(|re| re.is_match(line));
    if hit(&rules.error) {
        LogLevel::Error
    } else if hit(&rules.warn) {
        LogLevel::Warn
    } else if hit(&rules.debug) {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}
