use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

use crate::mutants::{CategoryResult, Mutation, Outcome, Report, Status};
use crate::output::Ui;
use crate::runner::Runner;

/// Raised after the pool drains when any worker recorded a structural error.
/// Reports collected before and alongside the failures are still carried.
#[derive(Debug, Error)]
#[error("{} of {total} mutation runs failed structurally", .errors.len())]
pub struct ScheduleError {
    pub total: usize,
    pub errors: Vec<String>,
    pub reports: Vec<Report>,
}

/// Bounded-concurrency fan-out over a mutation set. Workers pull from a
/// shared cursor; completion order is unordered and only the mutex-guarded
/// accumulators are shared.
pub struct Scheduler<'a> {
    runner: &'a Runner,
    ui: &'a dyn Ui,
    workers: usize,
}

impl<'a> Scheduler<'a> {
    pub fn new(runner: &'a Runner, ui: &'a dyn Ui, workers: usize) -> Self {
        Self {
            runner,
            ui,
            workers: workers.max(1),
        }
    }

    /// Run every mutation and fold outcomes into one report per source.
    /// A worker's structural error never cancels its siblings; it surfaces
    /// in the aggregate error once the pool has fully drained.
    pub fn run(&self, mutations: &[Mutation]) -> Result<Vec<Report>, ScheduleError> {
        let cursor = AtomicUsize::new(0);
        let collected: Mutex<BTreeMap<String, Report>> = Mutex::new(BTreeMap::new());
        let failures: Mutex<Vec<String>> = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for slot in 0..self.workers {
                let cursor = &cursor;
                let collected = &collected;
                let failures = &failures;
                scope.spawn(move || {
                    loop {
                        let next = cursor.fetch_add(1, Ordering::SeqCst);
                        let Some(mutation) = mutations.get(next) else {
                            break;
                        };
                        self.ui.test_started(mutation, slot);
                        let outcome = match self.runner.test_mutation(mutation) {
                            Ok(outcome) => outcome,
                            Err(err) => Outcome::error(&mutation.id, err.to_string()),
                        };
                        if outcome.status == Status::Error {
                            let detail = outcome.error.clone().unwrap_or_default();
                            failures
                                .lock()
                                .unwrap()
                                .push(format!("{}: {detail}", mutation.id));
                        }
                        self.ui.test_completed(mutation, &outcome);
                        fold(&mut collected.lock().unwrap(), mutation, outcome);
                    }
                });
            }
        });

        let mut reports: Vec<Report> = collected.into_inner().unwrap().into_values().collect();
        for report in &mut reports {
            report
                .results
                .sort_by(|a, b| a.mutator.name.cmp(&b.mutator.name));
            for category in &mut report.results {
                category
                    .outcomes
                    .sort_by(|a, b| a.mutation_id.cmp(&b.mutation_id));
            }
        }

        let errors = failures.into_inner().unwrap();
        if errors.is_empty() {
            Ok(reports)
        } else {
            Err(ScheduleError {
                total: mutations.len(),
                errors,
                reports,
            })
        }
    }
}

fn fold(reports: &mut BTreeMap<String, Report>, mutation: &Mutation, outcome: Outcome) {
    let survived = outcome.status == Status::Survived;
    let report = reports
        .entry(mutation.source.origin.to_string())
        .or_insert_with(|| Report {
            source: (*mutation.source).clone(),
            results: Vec::new(),
            diff: None,
            shard: None,
        });

    match report
        .results
        .iter_mut()
        .find(|c| c.mutator == mutation.mutator)
    {
        Some(category) => category.outcomes.push(outcome),
        None => report.results.push(CategoryResult {
            mutator: mutation.mutator.clone(),
            outcomes: vec![outcome],
        }),
    }

    if survived {
        let blob = report.diff.get_or_insert_with(String::new);
        blob.push_str(&mutation.diff);
        if !blob.ends_with('\n') {
            blob.push('\n');
        }
    }
}
