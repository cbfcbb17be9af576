use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use gomut::mutants::{Mutation, MutationType, Source, Status};
use gomut::runner::{RunError, Runner};
use gomut::workspace::{DiskWorkspace, TestVerdict, Workspace};
use regex::Regex;
use tempfile::TempDir;

/// Trips an assertion on any filesystem or process access.
struct PanicWorkspace;

impl Workspace for PanicWorkspace {
    fn sources(&self, _: &[Utf8PathBuf], _: &[Regex]) -> io::Result<Vec<Source>> {
        panic!("unexpected filesystem access");
    }
    fn find_project_root(&self, _: &Utf8Path) -> Utf8PathBuf {
        panic!("unexpected filesystem access");
    }
    fn create_temp_dir(&self, _: &str) -> io::Result<TempDir> {
        panic!("unexpected filesystem access");
    }
    fn copy_dir(&self, _: &Path, _: &Path) -> io::Result<()> {
        panic!("unexpected filesystem access");
    }
    fn read_file(&self, _: &Path) -> io::Result<Vec<u8>> {
        panic!("unexpected filesystem access");
    }
    fn write_file(&self, _: &Path, _: &[u8]) -> io::Result<()> {
        panic!("unexpected filesystem access");
    }
    fn run_test(&self, _: &Path, _: &Path, _: Duration) -> io::Result<(TestVerdict, String)> {
        panic!("unexpected process launch");
    }
}

/// Copies fail; everything else behaves like the disk.
struct BrokenCopyWorkspace {
    inner: DiskWorkspace,
}

impl Workspace for BrokenCopyWorkspace {
    fn sources(&self, roots: &[Utf8PathBuf], excludes: &[Regex]) -> io::Result<Vec<Source>> {
        self.inner.sources(roots, excludes)
    }
    fn find_project_root(&self, path: &Utf8Path) -> Utf8PathBuf {
        self.inner.find_project_root(path)
    }
    fn create_temp_dir(&self, prefix: &str) -> io::Result<TempDir> {
        self.inner.create_temp_dir(prefix)
    }
    fn copy_dir(&self, _: &Path, _: &Path) -> io::Result<()> {
        Err(io::Error::other("disk full"))
    }
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner.read_file(path)
    }
    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_file(path, bytes)
    }
    fn run_test(&self, wd: &Path, tf: &Path, t: Duration) -> io::Result<(TestVerdict, String)> {
        self.inner.run_test(wd, tf, t)
    }
}

fn mutation(source: Source, mutated: &[u8]) -> Mutation {
    let mutator = MutationType::new("boolean", 1);
    let id = Mutation::content_id(source.origin.as_str(), &mutator, mutated);
    Mutation {
        mutator,
        id,
        mutated: mutated.to_vec(),
        diff: String::new(),
        source: Arc::new(source),
    }
}

fn go_project(dir: &Path) -> Source {
    fs::write(dir.join("go.mod"), "module example.com/lib\n\ngo 1.22\n").unwrap();
    let origin_bytes = b"package lib\n\nfunc Flag() bool { return true }\n";
    fs::write(dir.join("lib.go"), origin_bytes).unwrap();
    let test_bytes = b"package lib\n";
    fs::write(dir.join("lib_test.go"), test_bytes).unwrap();

    let origin = Utf8PathBuf::from_path_buf(dir.join("lib.go")).unwrap();
    let test = Utf8PathBuf::from_path_buf(dir.join("lib_test.go")).unwrap();
    Source {
        origin,
        origin_hash: Source::content_hash(origin_bytes),
        test: Some(test),
        test_hash: Some(Source::content_hash(test_bytes)),
        package: "lib".to_string(),
    }
}

const MUTATED: &[u8] = b"package lib\n\nfunc Flag() bool { return false }\n";

#[test]
fn no_test_file_survives_without_touching_disk() {
    let source = Source {
        origin: Utf8PathBuf::from("/proj/lib.go"),
        origin_hash: "abc".to_string(),
        test: None,
        test_hash: None,
        package: "lib".to_string(),
    };
    let runner = Runner::new(Arc::new(PanicWorkspace), Duration::from_secs(1));

    let outcome = runner.test_mutation(&mutation(source, MUTATED)).unwrap();
    assert_eq!(outcome.status, Status::Survived);
    assert!(outcome.error.is_none());
}

#[test]
fn missing_origin_fails_structurally() {
    let source = Source {
        origin: Utf8PathBuf::new(),
        origin_hash: String::new(),
        test: None,
        test_hash: None,
        package: String::new(),
    };
    let runner = Runner::new(Arc::new(PanicWorkspace), Duration::from_secs(1));

    let result = runner.test_mutation(&mutation(source, MUTATED));
    assert!(matches!(result, Err(RunError::MissingOrigin(_))));
}

#[test]
fn passing_tests_mean_survived() {
    let dir = TempDir::new().unwrap();
    let source = go_project(dir.path());
    let runner = Runner::new(
        Arc::new(DiskWorkspace::new("true")),
        Duration::from_secs(5),
    );

    let outcome = runner.test_mutation(&mutation(source, MUTATED)).unwrap();
    assert_eq!(outcome.status, Status::Survived);
}

#[test]
fn failing_tests_mean_killed() {
    let dir = TempDir::new().unwrap();
    let source = go_project(dir.path());
    let runner = Runner::new(
        Arc::new(DiskWorkspace::new("false")),
        Duration::from_secs(5),
    );

    let outcome = runner.test_mutation(&mutation(source, MUTATED)).unwrap();
    assert_eq!(outcome.status, Status::Killed);
}

#[test]
fn timed_out_tests_mean_killed() {
    let dir = TempDir::new().unwrap();
    let source = go_project(dir.path());
    let runner = Runner::new(
        Arc::new(DiskWorkspace::new("tail -f")),
        Duration::from_millis(100),
    );

    let outcome = runner.test_mutation(&mutation(source, MUTATED)).unwrap();
    assert_eq!(outcome.status, Status::Killed);
}

#[test]
fn original_tree_is_never_modified() {
    let dir = TempDir::new().unwrap();
    let source = go_project(dir.path());
    let runner = Runner::new(
        Arc::new(DiskWorkspace::new("true")),
        Duration::from_secs(5),
    );

    runner.test_mutation(&mutation(source, MUTATED)).unwrap();

    let on_disk = fs::read(dir.path().join("lib.go")).unwrap();
    assert_eq!(on_disk, b"package lib\n\nfunc Flag() bool { return true }\n");
}

#[test]
fn copy_failure_is_an_error_outcome_not_survived() {
    let dir = TempDir::new().unwrap();
    let source = go_project(dir.path());
    let runner = Runner::new(
        Arc::new(BrokenCopyWorkspace {
            inner: DiskWorkspace::new("true"),
        }),
        Duration::from_secs(5),
    );

    let outcome = runner.test_mutation(&mutation(source, MUTATED)).unwrap();
    assert_eq!(outcome.status, Status::Error);
    assert!(outcome.error.as_deref().unwrap().contains("disk full"));
}

#[test]
fn source_outside_project_root_is_an_error_outcome() {
    // Root resolution falls back to the file's parent, so a test file in a
    // sibling directory cannot be made relative to it.
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("a")).unwrap();
    fs::create_dir_all(dir.path().join("b")).unwrap();
    fs::write(dir.path().join("a").join("lib.go"), "package a\n").unwrap();
    fs::write(dir.path().join("b").join("lib_test.go"), "package b\n").unwrap();

    let source = Source {
        origin: Utf8PathBuf::from_path_buf(dir.path().join("a").join("lib.go")).unwrap(),
        origin_hash: "h".to_string(),
        test: Some(Utf8PathBuf::from_path_buf(dir.path().join("b").join("lib_test.go")).unwrap()),
        test_hash: Some("t".to_string()),
        package: "a".to_string(),
    };
    let runner = Runner::new(
        Arc::new(DiskWorkspace::new("true")),
        Duration::from_secs(5),
    );

    let outcome = runner.test_mutation(&mutation(source, MUTATED)).unwrap();
    assert_eq!(outcome.status, Status::Error);
}
