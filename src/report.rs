//! Human-readable and JSON reporting for a patch run.
//!
//! Status lines are plain text here; the binary adds color on top.

use crate::runner::{PatchResult, RuleHit};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Updated,
    Skipped,
    Failed,
}

impl Status {
    pub fn of(result: &PatchResult) -> Self {
        if result.is_error() {
            Status::Failed
        } else if result.changed() {
            Status::Updated
        } else {
            Status::Skipped
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Status::Updated => "✓",
            Status::Skipped => "-",
            Status::Failed => "✗",
        }
    }
}

/// One status line per target, e.g. `✓ Updated src/pages/ChatPage.tsx`.
///
/// With `dry_run` the updated wording becomes `Would update`.
pub fn status_line(result: &PatchResult, dry_run: bool) -> String {
    let path = result.file().display();
    match (Status::of(result), result.error()) {
        (Status::Failed, Some(message)) => format!("✗ Error processing {path}: {message}"),
        (Status::Updated, _) if dry_run => format!("✓ Would update {path}"),
        (Status::Updated, _) => format!("✓ Updated {path}"),
        _ => format!("- Skipped {path} (no changes)"),
    }
}

pub fn hit_line(hit: &RuleHit) -> String {
    let noun = if hit.replacements == 1 {
        "replacement"
    } else {
        "replacements"
    };
    format!("  ✓ {} ({} {})", hit.rule, hit.replacements, noun)
}

/// Totals for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    pub fn from_results(results: &[PatchResult]) -> Self {
        results
            .iter()
            .fold(Summary::default(), |mut summary, result| {
                summary.total += 1;
                match Status::of(result) {
                    Status::Updated => summary.updated += 1,
                    Status::Skipped => summary.skipped += 1,
                    Status::Failed => summary.failed += 1,
                }
                summary
            })
    }

    /// Process exit status: non-zero only when there were targets and every one failed.
    pub fn exit_code(&self) -> i32 {
        if self.total > 0 && self.failed == self.total {
            1
        } else {
            0
        }
    }

    /// Summary line for a run; a dry run reports what would have been written.
    pub fn render(&self, dry_run: bool) -> String {
        if dry_run {
            format!(
                "Completed: {}/{} files would be updated",
                self.updated, self.total
            )
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Completed: {}/{} files updated",
            self.updated, self.total
        )
    }
}

pub fn to_json(results: &[PatchResult]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(rule: &str, replacements: usize) -> RuleHit {
        RuleHit {
            rule: rule.to_string(),
            replacements,
        }
    }

    #[test]
    fn test_status_lines() {
        let updated = PatchResult::updated("src/pages/ChatPage.tsx", vec![hit("a", 1)]);
        assert_eq!(
            status_line(&updated, false),
            "✓ Updated src/pages/ChatPage.tsx"
        );
        assert_eq!(
            status_line(&updated, true),
            "✓ Would update src/pages/ChatPage.tsx"
        );

        let skipped = PatchResult::unchanged("src/pages/TokensPage.tsx", Vec::new());
        assert_eq!(
            status_line(&skipped, false),
            "- Skipped src/pages/TokensPage.tsx (no changes)"
        );

        let failed = PatchResult::failed("src/pages/Gone.tsx", "file not found: /x");
        assert_eq!(
            status_line(&failed, false),
            "✗ Error processing src/pages/Gone.tsx: file not found: /x"
        );
    }

    #[test]
    fn test_hit_line_pluralizes() {
        assert_eq!(hit_line(&hit("sidebar", 1)), "  ✓ sidebar (1 replacement)");
        assert_eq!(hit_line(&hit("sidebar", 3)), "  ✓ sidebar (3 replacements)");
    }

    #[test]
    fn test_summary_and_exit_code() {
        let results = vec![
            PatchResult::updated("a", vec![hit("r", 1)]),
            PatchResult::unchanged("b", Vec::new()),
            PatchResult::failed("c", "boom"),
        ];
        let summary = Summary::from_results(&results);
        assert_eq!(summary.to_string(), "Completed: 1/3 files updated");
        assert_eq!(summary.render(false), "Completed: 1/3 files updated");
        assert_eq!(
            summary.render(true),
            "Completed: 1/3 files would be updated"
        );
        assert_eq!(summary.exit_code(), 0);

        let all_failed = vec![PatchResult::failed("a", "x"), PatchResult::failed("b", "y")];
        assert_eq!(Summary::from_results(&all_failed).exit_code(), 1);

        assert_eq!(Summary::from_results(&[]).exit_code(), 0);
    }

    #[test]
    fn test_to_json_shape() {
        let results = vec![PatchResult::updated("a.tsx", vec![hit("r", 2)])];
        let json: serde_json::Value = serde_json::from_str(&to_json(&results).unwrap()).unwrap();
        assert_eq!(json[0]["file"], "a.tsx");
        assert_eq!(json[0]["changed"], true);
        assert_eq!(json[0]["hits"][0]["replacements"], 2);
        assert!(json[0]["error"].is_null());
    }
}
