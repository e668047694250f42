pub mod loader;
pub mod schema;

pub use loader::{load_from_path, load_from_str, load_rules_from_path, ConfigError};
pub use schema::{
    GuardDefinition, Metadata, RuleDefinition, RuleSetConfig, Targets, ValidationError,
    ValidationIssue,
};
