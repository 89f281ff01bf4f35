use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Error;
use clap::Parser;
use itertools::Itertools;

use aspect_weaver::{weave, Opt, Project, TraceTarget, WeaveOptions, WeaveResult};
use weaver_pipeline::CancellationToken;

/// Interface for testing the weaving of a project.
#[derive(Debug)]
pub struct TestInterface {
    state: Result<WeaveResult, Error>,
}

/// Interface for testing a project that has been woven.
#[derive(Debug)]
pub struct TestInterfaceSuccessful {
    result: WeaveResult,
}

impl TestInterface {
    /// Weave the project in `tests/projects/<name>` using many linker workers.
    pub fn run_local<P: Into<PathBuf>>(name: P) -> Self {
        TestInterface::run(name, &["--num-cores", "4"], CancellationToken::new())
    }

    /// Weave the project in `tests/projects/<name>` linking with a single worker.
    pub fn run_single_worker<P: Into<PathBuf>>(name: P) -> Self {
        TestInterface::run(name, &["--num-cores", "1"], CancellationToken::new())
    }

    /// Weave the project in `tests/projects/<name>`, cancelled before the first step.
    pub fn run_cancelled<P: Into<PathBuf>>(name: P) -> Self {
        let token = CancellationToken::new();
        token.cancel();
        TestInterface::run(name, &[], token)
    }

    /// Expect the weaving to fail with the specified message.
    pub fn fail<S: AsRef<str>>(self, err: S) {
        let err = err.as_ref();
        if let Err(e) = self.state {
            if !format!("{:?}", e).contains(err) {
                panic!(
                    "Expecting the weaving to fail with '{}' but failed with {:?}",
                    err, e
                );
            }
        } else {
            panic!(
                "Expecting the weaving to fail with '{}' but didn't fail",
                err
            );
        }
    }

    /// Expect the weaving not to fail, unlocking the possibility to test the result.
    pub fn success(self) -> TestInterfaceSuccessful {
        match self.state {
            Ok(result) => TestInterfaceSuccessful { result },
            Err(e) => panic!("Expecting the weaving not to fail, but failed with {:?}", e),
        }
    }

    /// Weave a project going through the command line options, like the binary does.
    fn run<P: Into<PathBuf>>(name: P, extra_args: &[&str], token: CancellationToken) -> Self {
        super::setup();
        let path = super::project_file(name);
        let path = path.to_string_lossy().into_owned();
        let mut args = vec!["weaver", path.as_str(), "--ui=json", "-vv"];
        args.extend_from_slice(extra_args);
        let opt = Opt::parse_from(&args);

        let state = Project::from_file(&opt.project).and_then(|project| {
            weave(
                &project,
                &WeaveOptions {
                    num_workers: opt.num_cores,
                    cancellation: token,
                },
            )
        });
        TestInterface { state }
    }
}

impl TestInterfaceSuccessful {
    /// Check the names of the members of a linked type, in output order.
    pub fn members(self, ty: &str, names: &[&str]) -> Self {
        let linked = self
            .result
            .output
            .find_type(ty)
            .unwrap_or_else(|| panic!("Type {} not found in the output", ty));
        assert_eq!(linked.member_names(), names, "Wrong members of {}", ty);
        self
    }

    /// Check the markers emitted calling a member, `Type.Member` or `Type.Member:accessor`.
    pub fn trace(self, target: &str, markers: &[&str]) -> Self {
        let target = TraceTarget::from_str(target).expect("Invalid trace target");
        let actual = self
            .result
            .trace(&target.member, target.accessor)
            .unwrap_or_else(|e| panic!("Cannot trace {}: {:?}", target, e));
        assert_eq!(actual, markers, "Wrong trace of {}", target);
        self
    }

    /// Check that the rendered output contains the text.
    pub fn rendered_contains(self, text: &str) -> Self {
        let rendered = self.result.output.render();
        assert!(
            rendered.contains(text),
            "Expecting {:?} in the output:\n{}",
            text,
            rendered
        );
        self
    }

    /// Check that no error has been reported.
    pub fn no_errors(self) -> Self {
        let errors = self.result.diagnostics.errors().map(|d| d.to_string()).join("\n");
        assert!(errors.is_empty(), "Unexpected errors:\n{}", errors);
        self
    }

    /// Check the number of errors reported.
    pub fn error_count(self, count: usize) -> Self {
        let errors: Vec<_> = self.result.diagnostics.errors().collect();
        assert_eq!(errors.len(), count, "Wrong number of errors: {:?}", errors);
        self
    }

    /// Check that a diagnostic containing the message has been reported.
    pub fn diagnostic(self, message: &str) -> Self {
        let found = self
            .result
            .diagnostics
            .diagnostics()
            .iter()
            .any(|d| d.message().contains(message));
        assert!(
            found,
            "No diagnostic with {:?} in {:?}",
            message, self.result.diagnostics
        );
        self
    }

    /// Check the executed steps, in execution order.
    pub fn executed_steps(self, steps: &[&str]) -> Self {
        assert_eq!(self.result.executed_steps, steps);
        self
    }

    /// Check that an artifact with this name and content has been produced.
    pub fn artifact(self, name: &str, content: &str) -> Self {
        let artifact = self
            .result
            .artifacts
            .iter()
            .find(|a| a.name == name)
            .unwrap_or_else(|| panic!("Artifact {} not produced", name));
        assert_eq!(artifact.content, content);
        self
    }

    /// Check the aspects whose sources have been deferred.
    pub fn deferred(self, aspects: &[&str]) -> Self {
        let actual: Vec<_> = self
            .result
            .deferred_sources
            .iter()
            .map(|d| d.aspect.as_str())
            .collect();
        assert_eq!(actual, aspects);
        self
    }

    /// The whole result, for the checks not covered by this interface.
    pub fn result(&self) -> &WeaveResult {
        &self.result
    }
}
