use std::io;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use thiserror::Error;

use crate::mutants::{Mutation, Outcome, Status};
use crate::workspace::{TestVerdict, Workspace};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("mutation {0} has no source origin")]
    MissingOrigin(String),
}

/// Executes one mutation at a time: isolate, mutate, test, classify, clean
/// up. Collaborators are constructor-injected; the orchestrator holds no
/// global state.
pub struct Runner {
    workspace: Arc<dyn Workspace>,
    timeout: Duration,
    session: String,
}

impl Runner {
    pub fn new(workspace: Arc<dyn Workspace>, timeout: Duration) -> Self {
        Self {
            workspace,
            timeout,
            session: format!("{:08x}", fastrand::u32(..)),
        }
    }

    /// Test one mutation against its paired test file.
    ///
    /// A missing origin is a structural misuse and fails hard. A missing
    /// test file means nothing can kill the mutation: it survives without
    /// any filesystem access. Infrastructure failures (root resolution,
    /// copy, write) become `Error` outcomes, never a silent `Survived`.
    pub fn test_mutation(&self, mutation: &Mutation) -> Result<Outcome, RunError> {
        if mutation.source.origin.as_str().is_empty() {
            return Err(RunError::MissingOrigin(mutation.id.clone()));
        }
        let Some(test) = mutation.source.test.as_deref() else {
            return Ok(Outcome::new(&mutation.id, Status::Survived));
        };

        match self.execute(mutation, test) {
            Ok((verdict, _output)) => {
                let status = match verdict {
                    TestVerdict::Passed => Status::Survived,
                    // A timed-out run counts as a detection, same as a
                    // failing one: an induced infinite loop is a signal.
                    TestVerdict::Failed | TestVerdict::TimedOut => Status::Killed,
                };
                Ok(Outcome::new(&mutation.id, status))
            }
            Err(err) => Ok(Outcome::error(&mutation.id, err.to_string())),
        }
    }

    /// The copy-mutate-run protocol. The temp workspace is removed on every
    /// path out of this function; removal failures are swallowed.
    fn execute(&self, mutation: &Mutation, test: &Utf8Path) -> io::Result<(TestVerdict, String)> {
        let source = &mutation.source;
        let root = self.workspace.find_project_root(&source.origin);
        let rel_source = source
            .origin
            .strip_prefix(&root)
            .map_err(|_| outside_root(&source.origin, &root))?;
        let rel_test = test
            .strip_prefix(&root)
            .map_err(|_| outside_root(test, &root))?;

        let temp = self
            .workspace
            .create_temp_dir(&format!("gomut-{}-", self.session))?;
        self.workspace.copy_dir(root.as_std_path(), temp.path())?;

        let copied_source = temp.path().join(rel_source.as_std_path());
        let copied_test = temp.path().join(rel_test.as_std_path());
        self.workspace.write_file(&copied_source, &mutation.mutated)?;

        self.workspace
            .run_test(temp.path(), &copied_test, self.timeout)
    }
}

fn outside_root(path: &Utf8Path, root: &Utf8Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{path} is outside project root {root}"),
    )
}
