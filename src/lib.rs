pub mod mutants;
pub mod operators;
pub mod output;
pub mod parser;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod shard;
pub mod workspace;

/// True for Go source files that can be mutated. Test files are paired with
/// their origin, never mutated themselves.
pub fn is_mutable_source(path: &std::path::Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".go") && !name.ends_with("_test.go")
}

/// Path of the test file paired with a Go source file (`foo.go` ->
/// `foo_test.go`). The caller decides whether it exists.
pub fn test_file_for(origin: &camino::Utf8Path) -> camino::Utf8PathBuf {
    let stem = origin.file_stem().unwrap_or_default();
    origin.with_file_name(format!("{stem}_test.go"))
}
