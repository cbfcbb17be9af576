use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::mutants::{Report, Source, Status};
use crate::parser;

pub const INDEX_FILE: &str = "_index.yaml";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("report store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Aggregate view over every stored report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub total_mutations: usize,
    pub killed: usize,
    pub survived: usize,
    pub errors: usize,
    pub skipped: usize,
    /// source hash -> category name -> contributing report files
    pub sources: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

/// Content-addressed file name: a hash over the sorted
/// `mutationID|categoryName` pairs, so the name is stable under reordering
/// of a report's internal outcome entries.
pub fn report_file_name(report: &Report) -> String {
    let mut keys: Vec<String> = report
        .results
        .iter()
        .flat_map(|category| {
            category
                .outcomes
                .iter()
                .map(move |o| format!("{}|{}", o.mutation_id, category.mutator.name))
        })
        .collect();
    keys.sort();
    let digest = Sha256::digest(keys.join("\n").as_bytes());
    format!("{}.yaml", hex::encode(&digest[..8]))
}

/// Persist reports into `dir`. Reports with zero outcomes are skipped and
/// re-saving an already-stored report is a no-op.
pub fn save_reports(dir: &Path, reports: &[Report]) -> Result<(), StoreError> {
    fs::create_dir_all(dir)?;
    for report in reports {
        if report.outcome_count() == 0 {
            continue;
        }
        let path = dir.join(report_file_name(report));
        if path.exists() {
            continue;
        }
        fs::write(path, serde_yaml::to_string(report)?)?;
    }
    Ok(())
}

/// Every stored report with its file name, in file-name order.
pub fn load_reports(dir: &Path) -> Result<Vec<(String, Report)>, StoreError> {
    let mut reports = Vec::new();
    if !dir.is_dir() {
        return Ok(reports);
    }
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        if name == INDEX_FILE || !name.ends_with(".yaml") {
            continue;
        }
        let report: Report = serde_yaml::from_str(&fs::read_to_string(entry.path())?)?;
        reports.push((name, report));
    }
    Ok(reports)
}

/// Rebuild `_index.yaml` from the stored reports. When no reports remain the
/// index file is removed entirely.
pub fn regenerate_index(dir: &Path) -> Result<Index, StoreError> {
    let reports = load_reports(dir)?;
    let index_path = dir.join(INDEX_FILE);
    if reports.is_empty() {
        if index_path.exists() {
            fs::remove_file(&index_path)?;
        }
        return Ok(Index::default());
    }

    let mut index = Index::default();
    for (file, report) in &reports {
        for category in &report.results {
            for outcome in &category.outcomes {
                index.total_mutations += 1;
                match outcome.status {
                    Status::Killed => index.killed += 1,
                    Status::Survived => index.survived += 1,
                    Status::Skipped => index.skipped += 1,
                    Status::Error => index.errors += 1,
                }
            }
            let files = index
                .sources
                .entry(report.source.origin_hash.clone())
                .or_default()
                .entry(category.mutator.name.clone())
                .or_default();
            if !files.contains(file) {
                files.push(file.clone());
            }
        }
    }
    fs::write(&index_path, serde_yaml::to_string(&index)?)?;
    Ok(index)
}

struct HistoryEntry {
    source: Source,
    categories: BTreeMap<String, u32>,
    sharded: bool,
}

/// Sources needing a re-test, decided purely by content hash against stored
/// history:
/// - a historical source that disappeared (so its reports can be cleaned),
/// - an origin or test content hash that differs (including a removed test),
/// - a stored category that is no longer supported or changed version,
/// - any sharded report in the source's history (partial coverage).
///
/// Invalidation is asymmetric: a brand-new category absent from history does
/// not force a retest of an otherwise-unchanged source. An empty or missing
/// store marks every current source as changed.
pub fn check_updates(dir: &Path, current: &[Source]) -> Result<Vec<Source>, StoreError> {
    let reports = load_reports(dir)?;
    if reports.is_empty() {
        return Ok(current.to_vec());
    }

    let mut history: BTreeMap<String, HistoryEntry> = BTreeMap::new();
    for (_, report) in &reports {
        let entry = history
            .entry(report.source.origin.to_string())
            .or_insert_with(|| HistoryEntry {
                source: report.source.clone(),
                categories: BTreeMap::new(),
                sharded: false,
            });
        entry.sharded |= report.shard.is_some();
        for category in &report.results {
            entry
                .categories
                .insert(category.mutator.name.clone(), category.mutator.version);
        }
    }

    let mut changed = Vec::new();
    for entry in history.values() {
        if !current.iter().any(|s| s.origin == entry.source.origin) {
            changed.push(entry.source.clone());
        }
    }
    for source in current {
        let Some(entry) = history.get(source.origin.as_str()) else {
            changed.push(source.clone());
            continue;
        };
        if entry.source.origin_hash != source.origin_hash
            || entry.source.test_hash != source.test_hash
        {
            changed.push(source.clone());
            continue;
        }
        if entry.sharded {
            changed.push(source.clone());
            continue;
        }
        let stale_mutator = entry
            .categories
            .iter()
            .any(|(name, version)| match parser::lookup(name) {
                None => true,
                Some(def) => def.version != *version,
            });
        if stale_mutator {
            changed.push(source.clone());
        }
    }
    Ok(changed)
}

/// Delete the reports an incoming sharded run supersedes: content-stale
/// reports and complete-run reports for the given sources. Sibling shard
/// reports with matching content are kept so shards can accumulate in one
/// store without erasing each other.
pub fn clean_superseded_reports(dir: &Path, sources: &[Source]) -> Result<(), StoreError> {
    if !dir.is_dir() {
        return Ok(());
    }
    for (file, report) in load_reports(dir)? {
        let superseded = sources.iter().any(|s| {
            s.origin == report.source.origin
                && (s.origin_hash != report.source.origin_hash
                    || s.test_hash != report.source.test_hash
                    || report.shard.is_none())
        });
        if superseded {
            fs::remove_file(dir.join(&file))?;
        }
    }
    regenerate_index(dir)?;
    Ok(())
}

/// Delete stored reports matching the given sources (by origin path or
/// hash), then regenerate the index.
pub fn clean_reports(dir: &Path, sources: &[Source]) -> Result<(), StoreError> {
    if !dir.is_dir() {
        return Ok(());
    }
    for (file, report) in load_reports(dir)? {
        let matches = sources.iter().any(|s| {
            s.origin == report.source.origin || s.origin_hash == report.source.origin_hash
        });
        if matches {
            fs::remove_file(dir.join(&file))?;
        }
    }
    regenerate_index(dir)?;
    Ok(())
}
