use crate::rule::{compile_pattern, ApplyMode, Guard, RegexFlags, RuleError, SubstitutionRule};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct RuleSetConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub targets: Targets,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

impl RuleSetConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.rules.is_empty() {
            issues.push(ValidationIssue::EmptyRuleList);
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if rule.name.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule: None,
                    field: "name",
                });
            } else if !seen.insert(rule.name.as_str()) {
                issues.push(ValidationIssue::DuplicateName(rule.name.clone()));
            }

            if rule.pattern.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule: Some(rule.name.clone()),
                    field: "pattern",
                });
            }

            match &rule.guard {
                Some(GuardDefinition::Absent { text } | GuardDefinition::Present { text })
                    if text.is_empty() =>
                {
                    issues.push(ValidationIssue::MissingField {
                        rule: Some(rule.name.clone()),
                        field: "guard.text",
                    });
                }
                Some(
                    GuardDefinition::AbsentPattern { pattern }
                    | GuardDefinition::PresentPattern { pattern },
                ) if pattern.is_empty() => {
                    issues.push(ValidationIssue::MissingField {
                        rule: Some(rule.name.clone()),
                        field: "guard.pattern",
                    });
                }
                _ => {}
            }
        }

        if self.targets.files.iter().any(|file| file.trim().is_empty()) {
            issues.push(ValidationIssue::EmptyTarget);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Compile every rule definition, failing on the first malformed one.
    pub fn compile(&self) -> Result<Vec<SubstitutionRule>, RuleError> {
        self.rules.iter().map(RuleDefinition::compile).collect()
    }

    /// The configured root, with a relative `meta.root` taken against `config_dir`.
    pub fn root_relative_to(&self, config_dir: &Path) -> Option<PathBuf> {
        let root = self.meta.root.as_deref()?.trim();
        if root.is_empty() {
            return None;
        }
        let root = Path::new(root);
        if root.is_absolute() {
            Some(root.to_path_buf())
        } else {
            Some(config_dir.join(root))
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Directory target paths are resolved against
    #[serde(default)]
    pub root: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Targets {
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuleDefinition {
    pub name: String,
    pub pattern: String,
    /// Replacement template; `$1`, `${1}` and `${name}` expand capture groups
    #[serde(default)]
    pub replacement: String,
    #[serde(default)]
    pub apply: ApplyMode,
    #[serde(default)]
    pub flags: RegexFlags,
    #[serde(default)]
    pub guard: Option<GuardDefinition>,
}

impl RuleDefinition {
    pub fn compile(&self) -> Result<SubstitutionRule, RuleError> {
        let rule =
            SubstitutionRule::with_flags(&self.name, &self.pattern, self.flags, &self.replacement)?
                .mode(self.apply);

        let guard = match &self.guard {
            None => return Ok(rule),
            Some(GuardDefinition::Absent { text }) => Guard::Absent(text.clone()),
            Some(GuardDefinition::Present { text }) => Guard::Present(text.clone()),
            Some(GuardDefinition::AbsentPattern { pattern }) => {
                Guard::AbsentPattern(compile_pattern(&self.name, pattern, self.flags)?)
            }
            Some(GuardDefinition::PresentPattern { pattern }) => {
                Guard::PresentPattern(compile_pattern(&self.name, pattern, self.flags)?)
            }
        };
        Ok(rule.guard(guard))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GuardDefinition {
    Absent { text: String },
    Present { text: String },
    AbsentPattern { pattern: String },
    PresentPattern { pattern: String },
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyRuleList,
    MissingField {
        rule: Option<String>,
        field: &'static str,
    },
    DuplicateName(String),
    EmptyTarget,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyRuleList => write!(f, "rule table contains no rules"),
            ValidationIssue::MissingField { rule, field } => match rule {
                Some(name) => write!(f, "rule '{name}' missing required field '{field}'"),
                None => write!(f, "rule missing required field '{field}'"),
            },
            ValidationIssue::DuplicateName(name) => {
                write!(f, "rule name '{name}' is used more than once")
            }
            ValidationIssue::EmptyTarget => write!(f, "targets.files contains an empty path"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str, pattern: &str) -> RuleDefinition {
        RuleDefinition {
            name: name.to_string(),
            pattern: pattern.to_string(),
            replacement: String::new(),
            apply: ApplyMode::First,
            flags: RegexFlags::default(),
            guard: None,
        }
    }

    #[test]
    fn test_validate_collects_all_issues() {
        let mut blank_guard = definition("b", "x");
        blank_guard.guard = Some(GuardDefinition::Absent {
            text: String::new(),
        });
        let config = RuleSetConfig {
            rules: vec![definition("a", "x"), definition("a", ""), blank_guard],
            targets: Targets {
                files: vec![" ".to_string()],
            },
            ..RuleSetConfig::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err
            .issues
            .contains(&ValidationIssue::DuplicateName("a".to_string())));
        assert!(err.issues.contains(&ValidationIssue::MissingField {
            rule: Some("a".to_string()),
            field: "pattern",
        }));
        assert!(err.issues.contains(&ValidationIssue::MissingField {
            rule: Some("b".to_string()),
            field: "guard.text",
        }));
        assert!(err.issues.contains(&ValidationIssue::EmptyTarget));
    }

    #[test]
    fn test_validate_empty_rule_list() {
        let err = RuleSetConfig::default().validate().unwrap_err();
        assert_eq!(err.issues, vec![ValidationIssue::EmptyRuleList]);
        assert_eq!(err.to_string(), "rule table contains no rules");
    }

    #[test]
    fn test_compile_guard_pattern() {
        let mut rule = definition("r", "a");
        rule.guard = Some(GuardDefinition::AbsentPattern {
            pattern: "(broken".to_string(),
        });
        assert!(matches!(rule.compile(), Err(RuleError::InvalidPattern { .. })));

        rule.guard = Some(GuardDefinition::AbsentPattern {
            pattern: r"b+".to_string(),
        });
        let compiled = rule.compile().unwrap();
        assert!(!compiled.guard_predicate().unwrap().allows("abb"));
    }

    #[test]
    fn test_root_relative_to() {
        let mut config = RuleSetConfig::default();
        assert_eq!(config.root_relative_to(Path::new("/patches")), None);

        config.meta.root = Some("..".to_string());
        assert_eq!(
            config.root_relative_to(Path::new("/repo/patches")),
            Some(PathBuf::from("/repo/patches/.."))
        );
    }
}
