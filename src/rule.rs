//! Substitution rules: a named regex, a replacement template and an optional guard.
//!
//! Rules are compiled once, before any file is read. A pattern that fails to
//! compile, or a template that references a capture group the pattern does not
//! define, is rejected with [`RuleError`] so a malformed table never touches disk.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule '{rule}' has an invalid pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule '{rule}' replacement references unknown capture group '{group}'")]
    InvalidTemplate { rule: String, group: String },
}

/// How many matches a rule rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMode {
    /// Only the leftmost match
    #[default]
    First,
    /// Every non-overlapping match
    All,
}

impl fmt::Display for ApplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyMode::First => write!(f, "first"),
            ApplyMode::All => write!(f, "all"),
        }
    }
}

/// Regex syntax flags applied when compiling a rule pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct RegexFlags {
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub multi_line: bool,
    #[serde(default)]
    pub dot_matches_newline: bool,
}

/// Predicate deciding whether a rule may run against the current text.
#[derive(Clone)]
pub enum Guard {
    /// Run only when the literal text does not occur
    Absent(String),
    /// Run only when the literal text occurs
    Present(String),
    AbsentPattern(Regex),
    PresentPattern(Regex),
    Custom(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Guard {
    pub fn custom(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Guard::Custom(Arc::new(predicate))
    }

    /// Returns true when the rule is allowed to run against `text`.
    pub fn allows(&self, text: &str) -> bool {
        match self {
            Guard::Absent(needle) => !text.contains(needle.as_str()),
            Guard::Present(needle) => text.contains(needle.as_str()),
            Guard::AbsentPattern(re) => !re.is_match(text),
            Guard::PresentPattern(re) => re.is_match(text),
            Guard::Custom(predicate) => predicate(text),
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Absent(text) => f.debug_tuple("Absent").field(text).finish(),
            Guard::Present(text) => f.debug_tuple("Present").field(text).finish(),
            Guard::AbsentPattern(re) => f.debug_tuple("AbsentPattern").field(&re.as_str()).finish(),
            Guard::PresentPattern(re) => {
                f.debug_tuple("PresentPattern").field(&re.as_str()).finish()
            }
            Guard::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::Absent(text) => write!(f, "unless text contains {text:?}"),
            Guard::Present(text) => write!(f, "only if text contains {text:?}"),
            Guard::AbsentPattern(re) => write!(f, "unless text matches /{}/", re.as_str()),
            Guard::PresentPattern(re) => write!(f, "only if text matches /{}/", re.as_str()),
            Guard::Custom(_) => write!(f, "custom predicate"),
        }
    }
}

/// Outcome of running one rule against a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome<'a> {
    /// The guard rejected the text
    Guarded,
    NoMatch,
    Replaced {
        text: Cow<'a, str>,
        replacements: usize,
    },
}

#[derive(Debug, Clone)]
pub struct SubstitutionRule {
    name: String,
    pattern: Regex,
    replacement: String,
    mode: ApplyMode,
    guard: Option<Guard>,
}

impl SubstitutionRule {
    /// Compile a rule with default regex flags, rewriting the first match only.
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        replacement: impl Into<String>,
    ) -> Result<Self, RuleError> {
        Self::with_flags(name, pattern, RegexFlags::default(), replacement)
    }

    pub fn with_flags(
        name: impl Into<String>,
        pattern: &str,
        flags: RegexFlags,
        replacement: impl Into<String>,
    ) -> Result<Self, RuleError> {
        let name = name.into();
        let replacement = replacement.into();
        let pattern = compile_pattern(&name, pattern, flags)?;
        validate_template(&name, &pattern, &replacement)?;
        Ok(Self {
            name,
            pattern,
            replacement,
            mode: ApplyMode::First,
            guard: None,
        })
    }

    #[must_use]
    pub fn mode(mut self, mode: ApplyMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn apply_mode(&self) -> ApplyMode {
        self.mode
    }

    pub fn guard_predicate(&self) -> Option<&Guard> {
        self.guard.as_ref()
    }

    /// Run this rule against `text`.
    ///
    /// The guard is consulted first; a rejected guard or a missing match are
    /// both ordinary no-op outcomes, never errors.
    pub fn apply<'a>(&self, text: &'a str) -> RuleOutcome<'a> {
        if let Some(guard) = &self.guard {
            if !guard.allows(text) {
                return RuleOutcome::Guarded;
            }
        }

        let replacements = match self.mode {
            ApplyMode::First => usize::from(self.pattern.is_match(text)),
            ApplyMode::All => self.pattern.find_iter(text).count(),
        };
        if replacements == 0 {
            return RuleOutcome::NoMatch;
        }

        let text = match self.mode {
            ApplyMode::First => self.pattern.replacen(text, 1, self.replacement.as_str()),
            ApplyMode::All => self.pattern.replace_all(text, self.replacement.as_str()),
        };
        RuleOutcome::Replaced { text, replacements }
    }
}

pub(crate) fn compile_pattern(
    rule: &str,
    pattern: &str,
    flags: RegexFlags,
) -> Result<Regex, RuleError> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multi_line)
        .dot_matches_new_line(flags.dot_matches_newline)
        .build()
        .map_err(|source| RuleError::InvalidPattern {
            rule: rule.to_string(),
            source,
        })
}

/// Check every `$name` / `${name}` reference in `template` against the groups
/// `pattern` defines. `$$` is a literal dollar, as is a `$` with no name after it.
fn validate_template(rule: &str, pattern: &Regex, template: &str) -> Result<(), RuleError> {
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'$') {
            i += 2;
            continue;
        }

        let (group, next) = if bytes.get(i + 1) == Some(&b'{') {
            match template[i + 2..].find('}') {
                Some(len) => (&template[i + 2..i + 2 + len], i + 3 + len),
                None => {
                    i += 1;
                    continue;
                }
            }
        } else {
            let len = template[i + 1..]
                .bytes()
                .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
                .count();
            (&template[i + 1..i + 1 + len], i + 1 + len)
        };

        if group.is_empty() {
            i += 1;
            continue;
        }
        if !group_exists(pattern, group) {
            return Err(RuleError::InvalidTemplate {
                rule: rule.to_string(),
                group: group.to_string(),
            });
        }
        i = next;
    }

    Ok(())
}

fn group_exists(pattern: &Regex, group: &str) -> bool {
    match group.parse::<usize>() {
        Ok(index) => index < pattern.captures_len(),
        Err(_) => pattern.capture_names().flatten().any(|name| name == group),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replaced(outcome: RuleOutcome<'_>) -> (String, usize) {
        match outcome {
            RuleOutcome::Replaced { text, replacements } => (text.into_owned(), replacements),
            other => panic!("expected replacement, got {other:?}"),
        }
    }

    #[test]
    fn test_first_mode_rewrites_leftmost_match() {
        let rule = SubstitutionRule::new("upper", "foo", "FOO").unwrap();
        let (text, count) = replaced(rule.apply("foo bar foo"));
        assert_eq!(text, "FOO bar foo");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_all_mode_rewrites_every_match() {
        let rule = SubstitutionRule::new("upper", "foo", "FOO")
            .unwrap()
            .mode(ApplyMode::All);
        let (text, count) = replaced(rule.apply("foo bar foo"));
        assert_eq!(text, "FOO bar FOO");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_no_match_is_not_an_error() {
        let rule = SubstitutionRule::new("upper", "foo", "FOO").unwrap();
        assert_eq!(rule.apply("bar"), RuleOutcome::NoMatch);
    }

    #[test]
    fn test_capture_groups_expand() {
        let rule = SubstitutionRule::new(
            "param",
            r"(export function \w+\(\{[^}]*onNavigateToChat,)",
            "${1} onNavigateToWorkspace,",
        )
        .unwrap();
        let (text, _) = replaced(rule.apply("export function Page({ onNavigateToChat, x })"));
        assert_eq!(
            text,
            "export function Page({ onNavigateToChat, onNavigateToWorkspace, x })"
        );
    }

    #[test]
    fn test_absent_guard_blocks_reapplication() {
        let rule = SubstitutionRule::new("add", "a;", "a;\nb;")
            .unwrap()
            .guard(Guard::Absent("b;".to_string()));
        let (once, _) = replaced(rule.apply("a;"));
        assert_eq!(rule.apply(&once), RuleOutcome::Guarded);
    }

    #[test]
    fn test_pattern_and_custom_guards() {
        let present = Guard::PresentPattern(Regex::new(r"SidebarWis").unwrap());
        assert!(present.allows("<SidebarWis />"));
        assert!(!present.allows("<Sidebar />"));

        let custom = Guard::custom(|text| text.len() < 4);
        assert!(custom.allows("abc"));
        assert!(!custom.allows("abcd"));
        assert_eq!(format!("{custom:?}"), "Custom(..)");
    }

    #[test]
    fn test_dot_matches_newline_flag() {
        let flags = RegexFlags {
            dot_matches_newline: true,
            ..RegexFlags::default()
        };
        let rule = SubstitutionRule::with_flags("span", "a.b", flags, "X").unwrap();
        let (text, _) = replaced(rule.apply("a\nb"));
        assert_eq!(text, "X");

        let strict = SubstitutionRule::new("span", "a.b", "X").unwrap();
        assert_eq!(strict.apply("a\nb"), RuleOutcome::NoMatch);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = SubstitutionRule::new("broken", "(unclosed", "x").unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { ref rule, .. } if rule == "broken"));
    }

    #[test]
    fn test_template_unknown_group_rejected() {
        let err = SubstitutionRule::new("r", "(a)(b)", "${3}").unwrap_err();
        assert!(matches!(err, RuleError::InvalidTemplate { ref group, .. } if group == "3"));

        // `$1a` names a group called "1a", not group 1 followed by 'a'
        let err = SubstitutionRule::new("r", "(a)", "$1a").unwrap_err();
        assert!(matches!(err, RuleError::InvalidTemplate { ref group, .. } if group == "1a"));
    }

    #[test]
    fn test_template_accepts_named_groups_and_escapes() {
        assert!(SubstitutionRule::new("r", "(?P<prop>a)", "${prop}$$ $prop").is_ok());
        assert!(SubstitutionRule::new("r", "a", "cost: $$5 or $ alone or ${}").is_ok());
        assert!(SubstitutionRule::new("r", "(a)", "$0 ${1}").is_ok());
    }
}
