use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use tempfile::TempDir;

use crate::mutants::Source;

/// Directory names never copied into an isolated workspace and never
/// descended into during discovery.
const SKIP_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "vendor",
    "node_modules",
    "testdata",
    "dist",
    "build",
    ".gomut",
];

/// Markers that identify a Go project root.
const ROOT_MARKERS: &[&str] = &["go.mod", "go.work", ".git"];

/// Verdict of one external test invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestVerdict {
    Passed,
    Failed,
    TimedOut,
}

/// Filesystem and process operations the core depends on. Injected into the
/// orchestrator so tests can observe or stub every interaction.
pub trait Workspace: Send + Sync {
    /// Recursively discover mutable Go sources under the given roots and
    /// pair each with its `_test.go` file.
    fn sources(&self, roots: &[Utf8PathBuf], excludes: &[Regex]) -> io::Result<Vec<Source>>;

    /// Walk upward from `path` to the nearest project root marker.
    fn find_project_root(&self, path: &Utf8Path) -> Utf8PathBuf;

    fn create_temp_dir(&self, prefix: &str) -> io::Result<TempDir>;

    /// Recursive copy skipping VCS/vendor/dependency directories.
    fn copy_dir(&self, src: &Path, dst: &Path) -> io::Result<()>;

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Invoke the external test runner scoped to one test file, bounded by
    /// `timeout`. A run that overruns is killed and reported as `TimedOut`.
    /// The combined stdout/stderr of the run is returned with the verdict.
    fn run_test(&self, work_dir: &Path, test_file: &Path, timeout: Duration)
        -> io::Result<(TestVerdict, String)>;
}

/// Production implementation backed by the real filesystem and an external
/// test command (default `go test`).
pub struct DiskWorkspace {
    test_cmd: String,
}

impl DiskWorkspace {
    pub fn new(test_cmd: impl Into<String>) -> Self {
        Self {
            test_cmd: test_cmd.into(),
        }
    }
}

impl Default for DiskWorkspace {
    fn default() -> Self {
        Self::new("go test")
    }
}

impl Workspace for DiskWorkspace {
    fn sources(&self, roots: &[Utf8PathBuf], excludes: &[Regex]) -> io::Result<Vec<Source>> {
        let mut sources = Vec::new();
        for root in roots {
            let root = absolutize(root)?;
            if root.as_std_path().is_file() {
                if crate::is_mutable_source(root.as_std_path()) && !is_excluded(&root, excludes) {
                    sources.push(load_source(&root)?);
                }
                continue;
            }
            collect_sources(root.as_std_path(), excludes, &mut sources)?;
        }
        sources.sort_by(|a, b| a.origin.cmp(&b.origin));
        Ok(sources)
    }

    fn find_project_root(&self, path: &Utf8Path) -> Utf8PathBuf {
        let mut dir = path.parent().unwrap_or(path);
        loop {
            for marker in ROOT_MARKERS {
                if dir.join(marker).as_std_path().exists() {
                    return dir.to_path_buf();
                }
            }
            match dir.parent() {
                Some(parent) if parent != dir => dir = parent,
                _ => break,
            }
        }
        path.parent().unwrap_or(path).to_path_buf()
    }

    fn create_temp_dir(&self, prefix: &str) -> io::Result<TempDir> {
        tempfile::Builder::new().prefix(prefix).tempdir()
    }

    fn copy_dir(&self, src: &Path, dst: &Path) -> io::Result<()> {
        copy_dir_filtered(src, dst)
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        fs::write(path, bytes)
    }

    fn run_test(
        &self,
        work_dir: &Path,
        test_file: &Path,
        timeout: Duration,
    ) -> io::Result<(TestVerdict, String)> {
        let (program, args) = parse_test_cmd(&self.test_cmd);
        let mut cmd = Command::new(&program);
        for arg in &args {
            cmd.arg(arg);
        }
        // `go test` operates on the package directory containing the test
        // file; other commands get the file itself.
        if program == "go" {
            cmd.current_dir(test_file.parent().unwrap_or(work_dir));
            cmd.arg(".");
        } else {
            cmd.current_dir(work_dir);
            cmd.arg(test_file);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        let start = Instant::now();
        loop {
            match child.try_wait()? {
                Some(status) => {
                    let verdict = if status.success() {
                        TestVerdict::Passed
                    } else {
                        TestVerdict::Failed
                    };
                    return Ok((verdict, drain_output(&mut child)));
                }
                None => {
                    if start.elapsed() > timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Ok((TestVerdict::TimedOut, drain_output(&mut child)));
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }
    }
}

/// Combined stdout and stderr of a finished child. Reads after exit, so a
/// closed pipe yields whatever was written.
fn drain_output(child: &mut std::process::Child) -> String {
    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        let _ = io::Read::read_to_string(&mut stdout, &mut output);
    }
    if let Some(mut stderr) = child.stderr.take() {
        let _ = io::Read::read_to_string(&mut stderr, &mut output);
    }
    output
}

pub fn parse_test_cmd(cmd: &str) -> (String, Vec<String>) {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    match parts.split_first() {
        Some((program, rest)) => (
            program.to_string(),
            rest.iter().map(|s| s.to_string()).collect(),
        ),
        None => (cmd.to_string(), vec![]),
    }
}

fn should_skip(name: &str) -> bool {
    SKIP_NAMES.iter().any(|s| *s == name)
}

fn is_excluded(path: &Utf8Path, excludes: &[Regex]) -> bool {
    excludes.iter().any(|re| re.is_match(path.as_str()))
}

fn collect_sources(dir: &Path, excludes: &[Regex], out: &mut Vec<Source>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if should_skip(&name.to_string_lossy()) {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_sources(&path, excludes, out)?;
        } else if file_type.is_file() && crate::is_mutable_source(&path) {
            let origin = utf8_path(path)?;
            if !is_excluded(&origin, excludes) {
                out.push(load_source(&origin)?);
            }
        }
    }
    Ok(())
}

fn load_source(origin: &Utf8Path) -> io::Result<Source> {
    let bytes = fs::read(origin)?;
    let origin_hash = Source::content_hash(&bytes);
    let package = parse_package_name(&bytes)
        .or_else(|| origin.parent().and_then(|p| p.file_name()).map(String::from))
        .unwrap_or_default();

    let test_path = crate::test_file_for(origin);
    let (test, test_hash) = if test_path.as_std_path().is_file() {
        let test_bytes = fs::read(&test_path)?;
        (Some(test_path), Some(Source::content_hash(&test_bytes)))
    } else {
        (None, None)
    };

    Ok(Source {
        origin: origin.to_path_buf(),
        origin_hash,
        test,
        test_hash,
        package,
    })
}

fn parse_package_name(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    for line in text.lines() {
        if let Some(rest) = line.trim().strip_prefix("package ") {
            return rest.split_whitespace().next().map(String::from);
        }
    }
    None
}

fn copy_dir_filtered(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if should_skip(&name.to_string_lossy()) {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir_filtered(&src_path, &dst_path)?;
        } else if file_type.is_file() {
            fs::copy(&src_path, &dst_path)?;
        }
        // Symlinks and other special files are left behind.
    }
    Ok(())
}

fn absolutize(path: &Utf8Path) -> io::Result<Utf8PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()?;
    utf8_path(cwd.join(path.as_std_path()))
}

fn utf8_path(path: PathBuf) -> io::Result<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|p| io::Error::new(io::ErrorKind::InvalidData, format!("non-UTF-8 path: {}", p.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(path: &Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
    }

    #[test]
    fn copy_dir_copies_files_and_skips_git() {
        let src_dir = TempDir::new().unwrap();
        let src = src_dir.path();
        fs::write(src.join("main.go"), "package main").unwrap();
        fs::write(src.join("main_test.go"), "package main").unwrap();
        fs::create_dir(src.join(".git")).unwrap();
        fs::write(src.join(".git").join("HEAD"), "ref").unwrap();
        fs::create_dir(src.join("vendor")).unwrap();
        fs::write(src.join("vendor").join("dep.go"), "package dep").unwrap();

        let dst_dir = TempDir::new().unwrap();
        copy_dir_filtered(src, dst_dir.path()).unwrap();

        assert!(dst_dir.path().join("main.go").exists());
        assert!(dst_dir.path().join("main_test.go").exists());
        assert!(!dst_dir.path().join(".git").exists());
        assert!(!dst_dir.path().join("vendor").exists());
    }

    #[test]
    fn copy_dir_preserves_nested_structure() {
        let src_dir = TempDir::new().unwrap();
        let src = src_dir.path();
        fs::create_dir_all(src.join("internal").join("calc")).unwrap();
        fs::write(
            src.join("internal").join("calc").join("calc.go"),
            "package calc",
        )
        .unwrap();

        let dst_dir = TempDir::new().unwrap();
        copy_dir_filtered(src, dst_dir.path()).unwrap();

        assert_eq!(
            fs::read_to_string(dst_dir.path().join("internal").join("calc").join("calc.go"))
                .unwrap(),
            "package calc"
        );
    }

    #[test]
    fn find_project_root_finds_go_mod() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::write(root.join("go.mod"), "module example.com/app").unwrap();
        fs::write(root.join("pkg").join("app.go"), "package pkg").unwrap();

        let ws = DiskWorkspace::default();
        let found = ws.find_project_root(&utf8(&root.join("pkg").join("app.go")));
        assert_eq!(found.as_std_path(), root);
    }

    #[test]
    fn find_project_root_finds_git_dir() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::create_dir(root.join(".git")).unwrap();
        fs::write(root.join("pkg").join("app.go"), "package pkg").unwrap();

        let ws = DiskWorkspace::default();
        let found = ws.find_project_root(&utf8(&root.join("pkg").join("app.go")));
        assert_eq!(found.as_std_path(), root);
    }

    #[test]
    fn find_project_root_fallback_to_parent() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::write(root.join("pkg").join("app.go"), "package pkg").unwrap();

        let ws = DiskWorkspace::default();
        let found = ws.find_project_root(&utf8(&root.join("pkg").join("app.go")));
        assert_eq!(found.as_std_path(), root.join("pkg"));
    }

    #[test]
    fn sources_pairs_test_files_and_reads_package() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("go.mod"), "module example.com/app").unwrap();
        fs::write(root.join("calc.go"), "package app\n\nfunc Add() {}\n").unwrap();
        fs::write(root.join("calc_test.go"), "package app\n").unwrap();
        fs::write(root.join("alone.go"), "package app\n").unwrap();

        let ws = DiskWorkspace::default();
        let sources = ws.sources(&[utf8(root)], &[]).unwrap();
        assert_eq!(sources.len(), 2);

        let calc = sources
            .iter()
            .find(|s| s.origin.file_name() == Some("calc.go"))
            .unwrap();
        assert_eq!(calc.package, "app");
        assert!(calc.test.is_some());
        assert!(calc.test_hash.is_some());

        let alone = sources
            .iter()
            .find(|s| s.origin.file_name() == Some("alone.go"))
            .unwrap();
        assert!(alone.test.is_none());
        assert!(alone.test_hash.is_none());
    }

    #[test]
    fn sources_skips_excluded_and_filtered_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("vendor")).unwrap();
        fs::write(root.join("vendor").join("dep.go"), "package dep\n").unwrap();
        fs::write(root.join("keep.go"), "package app\n").unwrap();
        fs::write(root.join("gen.go"), "package app\n").unwrap();

        let ws = DiskWorkspace::default();
        let excludes = vec![Regex::new("gen\\.go$").unwrap()];
        let sources = ws.sources(&[utf8(root)], &excludes).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].origin.file_name(), Some("keep.go"));
    }

    #[test]
    fn parse_test_cmd_splits_program_and_args() {
        let (program, args) = parse_test_cmd("go test -count=1");
        assert_eq!(program, "go");
        assert_eq!(args, vec!["test", "-count=1"]);

        let (program, args) = parse_test_cmd("true");
        assert_eq!(program, "true");
        assert!(args.is_empty());
    }

    #[test]
    fn should_skip_filters_correctly() {
        assert!(should_skip(".git"));
        assert!(should_skip("vendor"));
        assert!(should_skip(".gomut"));
        assert!(!should_skip("internal"));
        assert!(!should_skip("main.go"));
    }

    #[test]
    fn run_test_times_out_and_kills() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        fs::write(&marker, "x").unwrap();

        // `tail -f <marker>` never exits on its own.
        let ws = DiskWorkspace::new("tail -f");
        let (verdict, _) = ws
            .run_test(dir.path(), &marker, Duration::from_millis(100))
            .unwrap();
        assert_eq!(verdict, TestVerdict::TimedOut);
    }

    #[test]
    fn run_test_captures_runner_output() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        fs::write(&marker, "ok\ntests passed\n").unwrap();

        // `cat <marker>` echoes the file content to stdout and exits 0.
        let ws = DiskWorkspace::new("cat");
        let (verdict, output) = ws
            .run_test(dir.path(), &marker, Duration::from_secs(5))
            .unwrap();
        assert_eq!(verdict, TestVerdict::Passed);
        assert!(output.contains("tests passed"));
    }
}
