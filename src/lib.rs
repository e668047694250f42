//! Text Patcher: idempotent regex codemods driven by declarative rule tables
//!
//! A rule table is an ordered list of [`SubstitutionRule`]s, each a named
//! regular expression, a replacement template and an optional [`Guard`]. The
//! [`PatchRunner`] applies the table to a fixed list of target files and
//! reports one [`PatchResult`] per file.
//!
//! # Guarantees
//!
//! - Malformed patterns and templates are rejected before any file is read
//! - A failing target never aborts the run; the error lands in its result
//! - Files are rewritten only when their text changed, via atomic overwrite
//! - Guards make re-running a table over patched files a no-op
//! - Targets are resolved inside a root directory and cannot escape it
//!
//! # Example
//!
//! ```no_run
//! use text_patcher::{Guard, PatchRunner, RootGuard, SubstitutionRule};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rule = SubstitutionRule::new(
//!     "addWorkspaceNav",
//!     r"onNavigateToChat\?: \(\) => void;",
//!     "onNavigateToChat?: () => void;\n  onNavigateToWorkspace?: () => void;",
//! )?
//! .guard(Guard::Absent("onNavigateToWorkspace".to_string()));
//!
//! let runner = PatchRunner::new(vec![rule], RootGuard::new(".")?);
//! for result in runner.run(&["src/pages/ChatPage.tsx"]) {
//!     println!("{}", text_patcher::report::status_line(&result, false));
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod report;
pub mod rule;
pub mod runner;
pub mod safety;
pub mod write;

// Re-exports
pub use config::{
    load_from_path, load_from_str, load_rules_from_path, ConfigError, RuleSetConfig,
};
pub use report::{Status, Summary};
pub use rule::{ApplyMode, Guard, RegexFlags, RuleError, RuleOutcome, SubstitutionRule};
pub use runner::{FilePlan, PatchError, PatchResult, PatchRunner, RuleHit};
pub use safety::{RootGuard, SafetyError};
pub use write::{atomic_write, WriteError};
