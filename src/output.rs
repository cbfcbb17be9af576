use console::Style;

use crate::mutants::{Mutation, Outcome, Report, Source, Status};
use crate::report::Index;

/// Progress sink for the scheduler and CLI. Notifications are
/// fire-and-forget; only `start` can influence control flow.
pub trait Ui: Send + Sync {
    fn start(&self) -> std::io::Result<()> {
        Ok(())
    }
    fn close(&self) {}
    fn concurrency_info(&self, _threads: usize, _shard: Option<(u64, u64)>) {}
    fn upcoming_tests(&self, _count: usize) {}
    fn test_started(&self, _mutation: &Mutation, _slot: usize) {}
    fn test_completed(&self, _mutation: &Mutation, _outcome: &Outcome) {}
    fn estimation(&self, _source: &Source, _count: usize) {}
}

/// No-op sink for tests and `--json` runs.
pub struct SilentUi;

impl Ui for SilentUi {}

pub struct ConsoleUi {
    verbose: bool,
}

impl ConsoleUi {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Ui for ConsoleUi {
    fn concurrency_info(&self, threads: usize, shard: Option<(u64, u64)>) {
        let dim = Style::new().dim();
        match shard {
            Some((index, total)) => println!(
                "{}",
                dim.apply_to(format!("workers: {threads}, shard {index}/{total}"))
            ),
            None => println!("{}", dim.apply_to(format!("workers: {threads}"))),
        }
    }

    fn upcoming_tests(&self, count: usize) {
        let dim = Style::new().dim();
        println!("{}", dim.apply_to(format!("{count} mutations to test")));
    }

    fn test_started(&self, mutation: &Mutation, slot: usize) {
        if self.verbose {
            let dim = Style::new().dim();
            println!(
                "{}",
                dim.apply_to(format!(
                    "[{slot}] testing {} [{}]",
                    mutation.id, mutation.mutator.name
                ))
            );
        }
    }

    fn test_completed(&self, mutation: &Mutation, outcome: &Outcome) {
        match outcome.status {
            Status::Survived => {
                let style = Style::new().yellow().bold();
                println!(
                    "{} {} [{}] survived in {}",
                    style.apply_to("!"),
                    mutation.id,
                    mutation.mutator.name,
                    mutation.source.origin,
                );
            }
            Status::Error => {
                let style = Style::new().red().bold();
                println!(
                    "{} {} [{}] {}",
                    style.apply_to("✗"),
                    mutation.id,
                    mutation.mutator.name,
                    outcome.error.as_deref().unwrap_or("structural error"),
                );
            }
            Status::Killed if self.verbose => {
                let style = Style::new().green();
                println!(
                    "{} {} [{}] killed",
                    style.apply_to("✓"),
                    mutation.id,
                    mutation.mutator.name,
                );
            }
            _ => {}
        }
    }

    fn estimation(&self, source: &Source, count: usize) {
        let dim = Style::new().dim();
        println!(
            "  {} {}: {count} mutations",
            dim.apply_to("·"),
            source.origin
        );
    }
}

pub fn print_error(msg: &str) {
    let style = Style::new().red().bold();
    eprintln!("{} {}", style.apply_to("✗"), msg);
}

pub fn print_success(msg: &str) {
    let style = Style::new().green().bold();
    println!("{} {}", style.apply_to("✓"), msg);
}

pub fn print_run_summary(index: &Index) {
    let tested = index.total_mutations - index.skipped;
    if index.survived == 0 && index.errors == 0 {
        let style = Style::new().green().bold();
        println!(
            "{} {} mutations, all killed",
            style.apply_to("✓"),
            tested,
        );
        return;
    }

    let style = Style::new().yellow().bold();
    println!(
        "{} {} survived / {} tested ({} killed)",
        style.apply_to("!"),
        index.survived,
        tested,
        index.killed,
    );
    if index.errors > 0 {
        let dim = Style::new().dim();
        println!(
            "  {} {} mutations hit structural errors",
            dim.apply_to("·"),
            index.errors
        );
    }
    if index.skipped > 0 {
        let dim = Style::new().dim();
        println!("  {} {} mutations skipped", dim.apply_to("·"), index.skipped);
    }
}

/// Replay one stored report: per-category tallies plus the surviving diff.
pub fn print_report(file: &str, report: &Report) {
    let header = Style::new().cyan().bold();
    let dim = Style::new().dim();
    println!(
        "{} {} {}",
        header.apply_to(&report.source.origin),
        dim.apply_to(format!("[{}]", report.source.package)),
        dim.apply_to(file),
    );
    for category in &report.results {
        println!(
            "  {} v{}: {} killed, {} survived, {} errors, {} skipped",
            category.mutator.name,
            category.mutator.version,
            category
                .outcomes
                .iter()
                .filter(|o| o.status == Status::Killed)
                .count(),
            category
                .outcomes
                .iter()
                .filter(|o| o.status == Status::Survived)
                .count(),
            category
                .outcomes
                .iter()
                .filter(|o| o.status == Status::Error)
                .count(),
            category
                .outcomes
                .iter()
                .filter(|o| o.status == Status::Skipped)
                .count(),
        );
    }
    if let Some(diff) = &report.diff {
        for line in diff.lines() {
            if line.starts_with('-') {
                println!("  {}", Style::new().red().apply_to(line));
            } else if line.starts_with('+') {
                println!("  {}", Style::new().green().apply_to(line));
            } else {
                println!("  {}", dim.apply_to(line));
            }
        }
    }
}
