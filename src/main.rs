use std::process;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use regex::Regex;

use gomut::mutants::{Mutation, Source, Status};
use gomut::output::{self, ConsoleUi, SilentUi, Ui};
use gomut::parser::{self, GenerateError};
use gomut::report;
use gomut::runner::Runner;
use gomut::scheduler::Scheduler;
use gomut::shard;
use gomut::workspace::{DiskWorkspace, Workspace};

#[derive(Parser)]
#[command(name = "gomut", version, about = "Mutation testing for Go")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run mutation testing over the given paths
    Run {
        /// Files or directories to mutate (default: current directory)
        paths: Vec<Utf8PathBuf>,
        /// Number of parallel test workers
        #[arg(short, long, default_value = "1")]
        workers: usize,
        /// Shard selector INDEX/TOTAL (e.g. 0/4)
        #[arg(long, value_parser = parse_shard)]
        shard: Option<(u64, u64)>,
        /// Regex of paths to exclude (repeatable)
        #[arg(long = "exclude", value_name = "REGEX")]
        excludes: Vec<String>,
        /// Mutation categories to apply (default: all)
        #[arg(long = "category", value_name = "NAME")]
        categories: Vec<String>,
        /// Test command run against each mutation
        #[arg(long, default_value = "go test")]
        test_cmd: String,
        /// Per-mutation test timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
        /// Report store directory
        #[arg(long, default_value = ".gomut")]
        report_dir: Utf8PathBuf,
        /// Retest everything, ignoring stored reports
        #[arg(long)]
        all: bool,
        /// Machine-readable JSON summary
        #[arg(long)]
        json: bool,
        /// Per-mutation progress output
        #[arg(short, long)]
        verbose: bool,
    },
    /// List the mutations that would run, without executing tests
    List {
        /// Files or directories to scan (default: current directory)
        paths: Vec<Utf8PathBuf>,
        /// Regex of paths to exclude (repeatable)
        #[arg(long = "exclude", value_name = "REGEX")]
        excludes: Vec<String>,
        /// Mutation categories to apply (default: all)
        #[arg(long = "category", value_name = "NAME")]
        categories: Vec<String>,
        /// Machine-readable JSON output
        #[arg(long)]
        json: bool,
    },
    /// Replay stored reports
    View {
        /// Report store directory
        #[arg(default_value = ".gomut")]
        dir: Utf8PathBuf,
    },
    /// Remove stored reports for the given paths
    Clean {
        /// Files or directories whose reports to drop (default: current directory)
        paths: Vec<Utf8PathBuf>,
        /// Regex of paths to exclude (repeatable)
        #[arg(long = "exclude", value_name = "REGEX")]
        excludes: Vec<String>,
        /// Report store directory
        #[arg(long, default_value = ".gomut")]
        report_dir: Utf8PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Run {
            paths,
            workers,
            shard,
            excludes,
            categories,
            test_cmd,
            timeout,
            report_dir,
            all,
            json,
            verbose,
        } => cmd_run(RunArgs {
            paths,
            workers,
            shard,
            excludes,
            categories,
            test_cmd,
            timeout,
            report_dir,
            all,
            json,
            verbose,
        }),
        Commands::List {
            paths,
            excludes,
            categories,
            json,
        } => cmd_list(paths, excludes, categories, json),
        Commands::View { dir } => cmd_view(dir),
        Commands::Clean {
            paths,
            excludes,
            report_dir,
        } => cmd_clean(paths, excludes, report_dir),
    };

    process::exit(exit_code);
}

struct RunArgs {
    paths: Vec<Utf8PathBuf>,
    workers: usize,
    shard: Option<(u64, u64)>,
    excludes: Vec<String>,
    categories: Vec<String>,
    test_cmd: String,
    timeout: u64,
    report_dir: Utf8PathBuf,
    all: bool,
    json: bool,
    verbose: bool,
}

fn parse_shard(raw: &str) -> Result<(u64, u64), String> {
    let (index, total) = raw
        .split_once('/')
        .ok_or_else(|| format!("expected INDEX/TOTAL, got '{raw}'"))?;
    let index: u64 = index
        .trim()
        .parse()
        .map_err(|_| format!("invalid shard index '{index}'"))?;
    let total: u64 = total
        .trim()
        .parse()
        .map_err(|_| format!("invalid shard total '{total}'"))?;
    if total == 0 {
        return Err("shard total must be positive".to_string());
    }
    if index >= total {
        return Err(format!("shard index {index} out of range for total {total}"));
    }
    Ok((index, total))
}

fn compile_excludes(patterns: &[String]) -> Result<Vec<Regex>, String> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| format!("invalid exclude pattern '{p}': {e}")))
        .collect()
}

fn roots_or_cwd(paths: Vec<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    if paths.is_empty() {
        vec![Utf8PathBuf::from(".")]
    } else {
        paths
    }
}

/// Generate the mutation sets for the given sources. Parse failures skip the
/// file but are reported; an unknown category fails the whole command.
fn generate_all(
    workspace: &dyn Workspace,
    sources: &[Source],
    categories: &[String],
) -> Result<(Vec<Mutation>, Vec<String>), GenerateError> {
    let mut mutations = Vec::new();
    let mut failures = Vec::new();
    for source in sources {
        let bytes = match workspace.read_file(source.origin.as_std_path()) {
            Ok(bytes) => bytes,
            Err(err) => {
                failures.push(format!("{}: {err}", source.origin));
                continue;
            }
        };
        let shared = Arc::new(source.clone());
        match parser::generate(&shared, &bytes, categories) {
            Ok(mut generated) => mutations.append(&mut generated),
            Err(err @ GenerateError::UnknownCategory(_)) => return Err(err),
            Err(err) => failures.push(err.to_string()),
        }
    }
    Ok((mutations, failures))
}

fn cmd_run(args: RunArgs) -> i32 {
    let excludes = match compile_excludes(&args.excludes) {
        Ok(excludes) => excludes,
        Err(msg) => {
            output::print_error(&msg);
            return 2;
        }
    };
    let categories = if args.categories.is_empty() {
        parser::default_categories()
    } else {
        args.categories.clone()
    };

    let workspace: Arc<dyn Workspace> = Arc::new(DiskWorkspace::new(args.test_cmd.clone()));
    let sources = match workspace.sources(&roots_or_cwd(args.paths.clone()), &excludes) {
        Ok(sources) => sources,
        Err(err) => {
            output::print_error(&format!("source discovery failed: {err}"));
            return 3;
        }
    };
    if sources.is_empty() {
        output::print_success("No Go sources found.");
        return 0;
    }

    let report_dir = args.report_dir.as_std_path();
    // A sharded run covers only part of each source's mutation set, so the
    // stored history can never prove a shard is up to date.
    let sharded = args.shard.is_some();
    let targets: Vec<Source> = if args.all || sharded {
        sources.clone()
    } else {
        let changed = match report::check_updates(report_dir, &sources) {
            Ok(changed) => changed,
            Err(err) => {
                output::print_error(&format!("stored report check failed: {err}"));
                return 3;
            }
        };
        // Deleted sources only need their stale reports dropped.
        let (current, stale): (Vec<Source>, Vec<Source>) = changed
            .into_iter()
            .partition(|c| sources.iter().any(|s| s.origin == c.origin));
        if !stale.is_empty() {
            if let Err(err) = report::clean_reports(report_dir, &stale) {
                output::print_error(&format!("stale report cleanup failed: {err}"));
                return 3;
            }
        }
        current
    };
    if targets.is_empty() {
        output::print_success("All sources up to date.");
        return 0;
    }

    let ui: Box<dyn Ui> = if args.json {
        Box::new(SilentUi)
    } else {
        Box::new(ConsoleUi::new(args.verbose))
    };
    if let Err(err) = ui.start() {
        output::print_error(&format!("failed to start UI: {err}"));
        return 3;
    }

    let (mutations, failures) = match generate_all(&*workspace, &targets, &categories) {
        Ok(generated) => generated,
        Err(err) => {
            output::print_error(&err.to_string());
            return 2;
        }
    };
    for failure in &failures {
        output::print_error(failure);
    }

    let mutations = match args.shard {
        Some((index, total)) => shard::shard(mutations, index, total as i64),
        None => mutations,
    };
    ui.concurrency_info(args.workers, args.shard);
    ui.upcoming_tests(mutations.len());

    let runner = Runner::new(Arc::clone(&workspace), Duration::from_secs(args.timeout));
    let scheduler = Scheduler::new(&runner, &*ui, args.workers);
    let (mut reports, structural_errors) = match scheduler.run(&mutations) {
        Ok(reports) => (reports, 0),
        Err(err) => {
            output::print_error(&err.to_string());
            let count = err.errors.len();
            (err.reports, count)
        }
    };
    if let Some((index, total)) = args.shard {
        for report in &mut reports {
            report.shard = Some(format!("{index}/{total}"));
        }
    }

    // Superseded reports for re-tested sources go first, then the fresh
    // ones; partial progress is persisted even after structural errors. A
    // sharded run must not erase sibling shards' reports.
    let cleaned = if sharded {
        report::clean_superseded_reports(report_dir, &targets)
    } else {
        report::clean_reports(report_dir, &targets)
    };
    if let Err(err) = cleaned {
        output::print_error(&format!("report cleanup failed: {err}"));
        return 3;
    }
    if let Err(err) = report::save_reports(report_dir, &reports) {
        output::print_error(&format!("report save failed: {err}"));
        return 3;
    }
    let index = match report::regenerate_index(report_dir) {
        Ok(index) => index,
        Err(err) => {
            output::print_error(&format!("index regeneration failed: {err}"));
            return 3;
        }
    };
    ui.close();

    if args.json {
        println!("{}", serde_json::to_string(&index).unwrap_or_default());
    } else {
        output::print_run_summary(&index);
    }

    if structural_errors > 0 || !failures.is_empty() {
        return 1;
    }
    let survived_now = reports
        .iter()
        .map(|r| r.count(Status::Survived))
        .sum::<usize>();
    if survived_now > 0 { 1 } else { 0 }
}

fn cmd_list(
    paths: Vec<Utf8PathBuf>,
    excludes: Vec<String>,
    categories: Vec<String>,
    json: bool,
) -> i32 {
    let excludes = match compile_excludes(&excludes) {
        Ok(excludes) => excludes,
        Err(msg) => {
            output::print_error(&msg);
            return 2;
        }
    };
    let categories = if categories.is_empty() {
        parser::default_categories()
    } else {
        categories
    };

    let workspace = DiskWorkspace::default();
    let sources = match workspace.sources(&roots_or_cwd(paths), &excludes) {
        Ok(sources) => sources,
        Err(err) => {
            output::print_error(&format!("source discovery failed: {err}"));
            return 3;
        }
    };

    let ui = ConsoleUi::new(false);
    let mut total = 0usize;
    let mut estimates = Vec::new();
    for source in &sources {
        let bytes = match workspace.read_file(source.origin.as_std_path()) {
            Ok(bytes) => bytes,
            Err(err) => {
                output::print_error(&format!("{}: {err}", source.origin));
                return 3;
            }
        };
        let shared = Arc::new(source.clone());
        let count = match parser::generate(&shared, &bytes, &categories) {
            Ok(mutations) => mutations.len(),
            Err(err @ GenerateError::UnknownCategory(_)) => {
                output::print_error(&err.to_string());
                return 2;
            }
            Err(err) => {
                output::print_error(&err.to_string());
                return 3;
            }
        };
        total += count;
        if json {
            estimates.push(serde_json::json!({
                "file": source.origin,
                "package": source.package,
                "mutations": count,
            }));
        } else {
            ui.estimation(source, count);
        }
    }

    if json {
        let summary = serde_json::json!({ "total": total, "sources": estimates });
        println!("{}", serde_json::to_string(&summary).unwrap_or_default());
    } else {
        println!("{total} mutations across {} sources", sources.len());
    }
    0
}

fn cmd_view(dir: Utf8PathBuf) -> i32 {
    let reports = match report::load_reports(dir.as_std_path()) {
        Ok(reports) => reports,
        Err(err) => {
            output::print_error(&format!("failed to load reports: {err}"));
            return 3;
        }
    };
    if reports.is_empty() {
        output::print_success("No stored reports.");
        return 0;
    }
    let mut survived = 0usize;
    for (file, report) in &reports {
        output::print_report(file, report);
        survived += report.count(Status::Survived);
    }
    println!(
        "{} reports, {} survived mutations",
        reports.len(),
        survived
    );
    0
}

fn cmd_clean(paths: Vec<Utf8PathBuf>, excludes: Vec<String>, report_dir: Utf8PathBuf) -> i32 {
    let excludes = match compile_excludes(&excludes) {
        Ok(excludes) => excludes,
        Err(msg) => {
            output::print_error(&msg);
            return 2;
        }
    };
    let workspace = DiskWorkspace::default();
    let sources = match workspace.sources(&roots_or_cwd(paths), &excludes) {
        Ok(sources) => sources,
        Err(err) => {
            output::print_error(&format!("source discovery failed: {err}"));
            return 3;
        }
    };
    if let Err(err) = report::clean_reports(report_dir.as_std_path(), &sources) {
        output::print_error(&format!("report cleanup failed: {err}"));
        return 3;
    }
    output::print_success("Stored reports cleaned.");
    0
}
