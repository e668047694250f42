use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::collections::HashMap;
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use text_patcher::config::{load_rules_from_path, RuleSetConfig};
use text_patcher::report::{self, Status, Summary};
use text_patcher::runner::suggest_rule_name;
use text_patcher::{FilePlan, PatchError, PatchResult, PatchRunner, RootGuard};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "text-patcher")]
#[command(about = "Apply idempotent regex rule tables to source files", long_about = None)]
#[command(version)]
struct Cli {
    /// Print per-rule results and debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply rule tables to their target files
    Apply {
        #[command(flatten)]
        run: RunArgs,

        /// Dry run - report what would change without writing files
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Report which targets would change, without writing
    Check {
        #[command(flatten)]
        run: RunArgs,
    },

    /// List the rules in a rule table
    List {
        /// Rule table to list (otherwise all tables in patches/)
        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// Directory to look for patches/ in
        #[arg(long, env = "TEXT_PATCHER_ROOT")]
        root: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Rule table to apply (otherwise all tables in patches/)
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Directory target paths are resolved against
    #[arg(long, env = "TEXT_PATCHER_ROOT")]
    root: Option<PathBuf>,

    /// Only apply the named rule (repeatable)
    #[arg(long = "rule", value_name = "NAME")]
    only: Vec<String>,

    /// Show unified diff of changes
    #[arg(short, long)]
    diff: bool,

    /// Number of files to patch concurrently
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Print results as JSON instead of status lines
    #[arg(long)]
    json: bool,

    /// Target files, replacing the table's [targets] list
    targets: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    if cli.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let code = match cli.command {
        Commands::Apply { run, dry_run } => cmd_run(run, dry_run, cli.verbose)?,
        Commands::Check { run } => cmd_run(run, true, cli.verbose)?,
        Commands::List { rules, root } => {
            cmd_list(rules, root)?;
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }

    Ok(())
}

/// Logs go to stderr so the stdout report stays machine-comparable.
fn init_logging(verbose: bool) {
    let default = if verbose { "text_patcher=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Helper: Discover all .toml rule tables in a patches/ directory.
///
/// Discovery order:
/// 1. `<root>/patches` when a root was given.
/// 2. `./patches` relative to the current working directory.
fn discover_rule_files(root: Option<&Path>) -> Result<Vec<PathBuf>> {
    let cwd_patches_dir = env::current_dir().ok().map(|cwd| cwd.join("patches"));
    let root_patches_dir = root.map(|root| root.join("patches"));

    let candidate_dirs: Vec<PathBuf> = root_patches_dir
        .into_iter()
        .chain(cwd_patches_dir)
        .collect();

    for patches_dir in &candidate_dirs {
        if !patches_dir.is_dir() {
            continue;
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(patches_dir).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
            {
                files.push(entry.path().to_path_buf());
            }
        }

        files.sort();

        if !files.is_empty() {
            return Ok(files);
        }
    }

    anyhow::bail!("No .toml rule tables found; pass one with --rules or add one under ./patches")
}

/// Resolve the root for one rule table.
///
/// Priority order:
/// 1. `--root` flag or `TEXT_PATCHER_ROOT`
/// 2. `meta.root` in the table, relative to the table's directory
/// 3. Current directory
fn resolve_root(
    cli_root: Option<&Path>,
    config: &RuleSetConfig,
    rule_file: &Path,
) -> Result<PathBuf> {
    if let Some(root) = cli_root {
        return Ok(root.to_path_buf());
    }

    let config_dir = rule_file.parent().unwrap_or_else(|| Path::new("."));
    if let Some(root) = config.root_relative_to(config_dir) {
        return Ok(root);
    }

    env::current_dir().context("failed to read current directory")
}

/// Helper: Show unified diff between original and patched content
fn display_diff(file: &Path, plan: &FilePlan) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(&plan.original, &plan.patched);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn print_result(result: &PatchResult, dry_run: bool, verbose: bool) {
    let line = report::status_line(result, dry_run);
    match Status::of(result) {
        Status::Updated => println!("{}", line.green()),
        Status::Skipped => println!("{}", line.dimmed()),
        Status::Failed => println!("{}", line.red()),
    }

    if verbose {
        for hit in result.hits() {
            println!("{}", report::hit_line(hit).dimmed());
        }
    }
}

fn cmd_run(args: RunArgs, dry_run: bool, verbose: bool) -> Result<i32> {
    // 1. Determine rule tables to load
    let rule_files = match &args.rules {
        Some(path) => vec![path.clone()],
        None => discover_rule_files(args.root.as_deref())?,
    };

    // 2. Load and compile every table before touching any file
    let mut runs = Vec::with_capacity(rule_files.len());
    let mut loaded_names = Vec::new();
    for rule_file in &rule_files {
        let (config, rules) = load_rules_from_path(rule_file)?;
        loaded_names.extend(rules.iter().map(|rule| rule.name().to_string()));
        let root = resolve_root(args.root.as_deref(), &config, rule_file)?;
        let guard = RootGuard::new(&root)
            .with_context(|| format!("invalid root directory {}", root.display()))?;
        let runner = PatchRunner::new(rules, guard).retain_named(&args.only);

        let targets: Vec<PathBuf> = if args.targets.is_empty() {
            config.targets.files.iter().map(PathBuf::from).collect()
        } else {
            args.targets.clone()
        };

        runs.push((config, runner, targets));
    }

    // A --rule name only has to exist in one of the loaded tables.
    for name in &args.only {
        let known = runs
            .iter()
            .any(|(_, runner, _)| runner.rules().iter().any(|rule| rule.name() == name));
        if !known {
            let candidates = loaded_names.iter().map(String::as_str);
            return Err(PatchError::UnknownRule {
                name: name.clone(),
                suggestion: suggest_rule_name(name, candidates),
            }
            .into());
        }
    }
    runs.retain(|(_, runner, _)| !runner.rules().is_empty());

    // 3. Apply each table
    let mut all_results = Vec::new();
    for (config, runner, targets) in runs {
        if !args.json {
            let name = if config.meta.name.is_empty() {
                "rule table"
            } else {
                config.meta.name.as_str()
            };
            println!(
                "{}",
                format!(
                    "Applying {} ({} rules, {} files) in {}",
                    name,
                    runner.rules().len(),
                    targets.len(),
                    runner.root().display()
                )
                .bold()
            );
        }

        // Plans are read-only; capture them up front for diff output.
        let plans: HashMap<usize, FilePlan> = if args.diff && !args.json {
            targets
                .iter()
                .enumerate()
                .filter_map(|(idx, target)| {
                    runner.plan_file(target).ok().map(|(_, plan)| (idx, plan))
                })
                .collect()
        } else {
            HashMap::new()
        };

        let results = if dry_run {
            runner.check(&targets)
        } else {
            runner.run_parallel(&targets, args.jobs)
        };

        if !args.json {
            for (idx, result) in results.iter().enumerate() {
                print_result(result, dry_run, verbose);
                if result.changed() {
                    if let Some(plan) = plans.get(&idx) {
                        display_diff(result.file(), plan);
                    }
                }
            }
            println!();
        }

        all_results.extend(results);
    }

    // 4. Summary
    let summary = Summary::from_results(&all_results);
    if args.json {
        println!("{}", report::to_json(&all_results)?);
    } else {
        println!("{}", summary.render(dry_run).bold());
    }

    Ok(summary.exit_code())
}

fn cmd_list(rules: Option<PathBuf>, root: Option<PathBuf>) -> Result<()> {
    let rule_files = match rules {
        Some(path) => vec![path],
        None => discover_rule_files(root.as_deref())?,
    };

    for rule_file in rule_files {
        let (config, rules) = load_rules_from_path(&rule_file)?;

        println!("{}", rule_file.display().to_string().bold());
        if let Some(description) = &config.meta.description {
            println!("  {}", description.dimmed());
        }

        for rule in &rules {
            println!(
                "  {} [{}] /{}/",
                rule.name().cyan(),
                rule.apply_mode(),
                rule.pattern().as_str()
            );
            if let Some(guard) = rule.guard_predicate() {
                println!("    {}", guard.to_string().dimmed());
            }
        }

        println!(
            "  {} target file(s)",
            config.targets.files.len().to_string().bold()
        );
        println!();
    }

    Ok(())
}
