use crate::config::schema::{RuleSetConfig, ValidationError};
use crate::rule::{RuleError, SubstitutionRule};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    Rule {
        path: Option<PathBuf>,
        source: RuleError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = Some(path.to_path_buf());
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml { path, source },
            ConfigError::Validation { path: None, source } => {
                ConfigError::Validation { path, source }
            }
            ConfigError::Rule { path: None, source } => ConfigError::Rule { path, source },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read rule table from {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse rule table TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse rule table TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid rule table ({}): {}", path.display(), source),
                None => write!(f, "invalid rule table: {}", source),
            },
            ConfigError::Rule { path, source } => match path {
                Some(path) => write!(f, "{} ({})", source, path.display()),
                None => write!(f, "{}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::Rule { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<RuleSetConfig, ConfigError> {
    let config: RuleSetConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<RuleSetConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Load a rule table and compile its rules in one step.
///
/// Any malformed pattern surfaces here, before a target file is opened.
pub fn load_rules_from_path(
    path: impl AsRef<Path>,
) -> Result<(RuleSetConfig, Vec<SubstitutionRule>), ConfigError> {
    let path = path.as_ref();
    let config = load_from_path(path)?;
    let rules = config.compile().map_err(|source| ConfigError::Rule {
        path: Some(path.to_path_buf()),
        source,
    })?;
    Ok((config, rules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::ApplyMode;

    #[test]
    fn test_load_from_str_defaults() {
        let config = load_from_str(
            r#"
[[rules]]
name = "rename"
pattern = "foo"
replacement = "bar"
"#,
        )
        .unwrap();

        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].apply, ApplyMode::First);
        assert!(config.rules[0].guard.is_none());
        assert!(config.targets.files.is_empty());
    }

    #[test]
    fn test_load_from_str_rejects_unknown_mode() {
        let err = load_from_str(
            r#"
[[rules]]
name = "rename"
pattern = "foo"
apply = "sometimes"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Toml { path: None, .. }));
    }

    #[test]
    fn test_load_from_path_attaches_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        fs::write(&path, "[meta]\nname = \"empty\"\n").unwrap();

        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { path: Some(_), .. }));
        assert!(err.to_string().contains("empty.toml"));
    }

    #[test]
    fn test_load_rules_reports_invalid_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(
            &path,
            "[[rules]]\nname = \"bad\"\npattern = \"(oops\"\nreplacement = \"x\"\n",
        )
        .unwrap();

        let err = load_rules_from_path(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Rule {
                source: RuleError::InvalidPattern { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_from_path("/nonexistent/rules.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
