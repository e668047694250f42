//! Patch runner - applies an ordered rule table to each target file
//!
//! Every target is handled on its own:
//! - The path is resolved against the root and read as UTF-8
//! - Rules run in table order against the progressively edited text
//! - The file is rewritten only when the final text differs from what was read
//!
//! A failure on one target is recorded in its [`PatchResult`] and never stops
//! the run.

use crate::rule::{RuleOutcome, SubstitutionRule};
use crate::safety::{RootGuard, SafetyError};
use crate::write::{atomic_write, WriteError};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Minimum Jaro-Winkler similarity for a rule name to be offered as a suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.8;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: WriteError,
    },

    #[error(transparent)]
    Safety(SafetyError),

    #[error("unknown rule '{name}'{}", suggestion_hint(.suggestion))]
    UnknownRule {
        name: String,
        suggestion: Option<String>,
    },
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '{name}'?)"),
        None => String::new(),
    }
}

impl From<SafetyError> for PatchError {
    fn from(e: SafetyError) -> Self {
        match e {
            SafetyError::NotFound(path) => PatchError::FileNotFound(path),
            other => PatchError::Safety(other),
        }
    }
}

/// One rule that matched while patching a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleHit {
    pub rule: String,
    pub replacements: usize,
}

/// Outcome for a single target file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use = "PatchResult should be checked for changes and errors"]
pub struct PatchResult {
    file: PathBuf,
    hits: Vec<RuleHit>,
    changed: bool,
    error: Option<String>,
}

impl PatchResult {
    pub fn updated(file: impl Into<PathBuf>, hits: Vec<RuleHit>) -> Self {
        Self {
            file: file.into(),
            hits,
            changed: true,
            error: None,
        }
    }

    pub fn unchanged(file: impl Into<PathBuf>, hits: Vec<RuleHit>) -> Self {
        Self {
            file: file.into(),
            hits,
            changed: false,
            error: None,
        }
    }

    pub fn failed(file: impl Into<PathBuf>, error: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            hits: Vec::new(),
            changed: false,
            error: Some(error.into()),
        }
    }

    /// The target path as it was given to the runner.
    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn hits(&self) -> &[RuleHit] {
        &self.hits
    }

    /// Names of the rules that matched, in rule order.
    pub fn rules_applied(&self) -> impl Iterator<Item = &str> + '_ {
        self.hits.iter().map(|hit| hit.rule.as_str())
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// The effect of a rule table on one text, computed without touching disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePlan {
    pub original: String,
    pub patched: String,
    pub hits: Vec<RuleHit>,
}

impl FilePlan {
    pub fn is_changed(&self) -> bool {
        self.original != self.patched
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Write,
    DryRun,
}

/// Applies an ordered list of [`SubstitutionRule`]s to target files under a root.
#[derive(Debug, Clone)]
pub struct PatchRunner {
    rules: Vec<SubstitutionRule>,
    guard: RootGuard,
}

impl PatchRunner {
    pub fn new(rules: Vec<SubstitutionRule>, guard: RootGuard) -> Self {
        Self { rules, guard }
    }

    pub fn rules(&self) -> &[SubstitutionRule] {
        &self.rules
    }

    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    /// Keep only the named rules, preserving table order.
    ///
    /// Every name must exist in this runner's table.
    pub fn select<S: AsRef<str>>(self, names: &[S]) -> Result<Self, PatchError> {
        for name in names {
            let name = name.as_ref();
            if !self.rules.iter().any(|rule| rule.name() == name) {
                return Err(PatchError::UnknownRule {
                    name: name.to_string(),
                    suggestion: suggest_rule_name(name, self.rules.iter().map(|r| r.name())),
                });
            }
        }
        Ok(self.retain_named(names))
    }

    /// Keep only rules whose names appear in `names`; unknown names are ignored.
    ///
    /// An empty `names` keeps the whole table. Used when one selection spans
    /// several rule tables and each table knows only some of the names.
    pub fn retain_named<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        if !names.is_empty() {
            self.rules
                .retain(|rule| names.iter().any(|name| name.as_ref() == rule.name()));
        }
        self
    }

    /// Run every rule against `text` in order and report what changed.
    pub fn plan_text(&self, text: &str) -> FilePlan {
        let mut current = text.to_string();
        let mut hits = Vec::new();

        for rule in &self.rules {
            let outcome = rule.apply(&current);
            let rewritten = match outcome {
                RuleOutcome::Guarded => {
                    debug!(rule = rule.name(), "guard rejected text, skipping rule");
                    None
                }
                RuleOutcome::NoMatch => {
                    debug!(rule = rule.name(), "pattern did not match, skipping rule");
                    None
                }
                RuleOutcome::Replaced { text, replacements } => {
                    debug!(rule = rule.name(), replacements, "rule applied");
                    hits.push(RuleHit {
                        rule: rule.name().to_string(),
                        replacements,
                    });
                    Some(text.into_owned())
                }
            };
            if let Some(rewritten) = rewritten {
                current = rewritten;
            }
        }

        FilePlan {
            original: text.to_string(),
            patched: current,
            hits,
        }
    }

    /// Resolve and read `target`, then plan the rule table against it.
    ///
    /// Returns the canonical path alongside the plan. Nothing is written.
    pub fn plan_file(&self, target: &Path) -> Result<(PathBuf, FilePlan), PatchError> {
        let path = self.guard.resolve(target)?;
        let content = fs::read_to_string(&path).map_err(|source| PatchError::Io {
            path: path.clone(),
            source,
        })?;
        Ok((path, self.plan_text(&content)))
    }

    /// Patch every target in order, writing back files whose text changed.
    pub fn run<P: AsRef<Path>>(&self, targets: &[P]) -> Vec<PatchResult> {
        targets
            .iter()
            .map(|target| self.process(target.as_ref(), Mode::Write))
            .collect()
    }

    /// Same outcomes as [`PatchRunner::run`] without writing anything.
    pub fn check<P: AsRef<Path>>(&self, targets: &[P]) -> Vec<PatchResult> {
        targets
            .iter()
            .map(|target| self.process(target.as_ref(), Mode::DryRun))
            .collect()
    }

    /// Patch targets on up to `jobs` worker threads.
    ///
    /// Results come back in target order. A list that names the same file
    /// twice is processed sequentially, since both entries would edit one file.
    pub fn run_parallel<P: AsRef<Path> + Sync>(
        &self,
        targets: &[P],
        jobs: usize,
    ) -> Vec<PatchResult> {
        let jobs = jobs.clamp(1, targets.len().max(1));
        if jobs == 1 || self.has_duplicates(targets) {
            return self.run(targets);
        }

        let next = AtomicUsize::new(0);
        let mut slots: Vec<Option<PatchResult>> = vec![None; targets.len()];

        thread::scope(|scope| {
            let workers: Vec<_> = (0..jobs)
                .map(|_| {
                    scope.spawn(|| {
                        let mut done = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::Relaxed);
                            let Some(target) = targets.get(index) else {
                                break;
                            };
                            done.push((index, self.process(target.as_ref(), Mode::Write)));
                        }
                        done
                    })
                })
                .collect();

            for worker in workers {
                match worker.join() {
                    Ok(done) => {
                        for (index, result) in done {
                            slots[index] = Some(result);
                        }
                    }
                    Err(payload) => std::panic::resume_unwind(payload),
                }
            }
        });

        slots.into_iter().flatten().collect()
    }

    /// True when two targets name the same file, after resolving against the root.
    ///
    /// `a.tsx`, `./a.tsx` and an absolute path to it all collide. Targets that do
    /// not resolve are never edited, so they count as distinct.
    fn has_duplicates<P: AsRef<Path>>(&self, targets: &[P]) -> bool {
        let mut seen = HashSet::with_capacity(targets.len());
        targets
            .iter()
            .filter_map(|target| self.guard.resolve(target).ok())
            .any(|path| !seen.insert(path))
    }

    fn process(&self, target: &Path, mode: Mode) -> PatchResult {
        match self.process_file(target, mode) {
            Ok(plan) if plan.is_changed() => PatchResult::updated(target, plan.hits),
            Ok(plan) => PatchResult::unchanged(target, plan.hits),
            Err(e) => {
                warn!(file = %target.display(), error = %e, "failed to patch file");
                PatchResult::failed(target, e.to_string())
            }
        }
    }

    fn process_file(&self, target: &Path, mode: Mode) -> Result<FilePlan, PatchError> {
        let (path, plan) = self.plan_file(target)?;

        if plan.is_changed() && mode == Mode::Write {
            atomic_write(&path, plan.patched.as_bytes()).map_err(|source| PatchError::Write {
                path: path.clone(),
                source,
            })?;
            info!(file = %path.display(), rules = plan.hits.len(), "updated file");
        }

        Ok(plan)
    }
}

/// Closest known rule name to `name`, if any is similar enough to suggest.
pub fn suggest_rule_name<'a>(
    name: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    candidates
        .into_iter()
        .map(|candidate| (strsim::jaro_winkler(name, candidate), candidate))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.to_string())
}
