use std::fmt::Display;

use anyhow::Error;
use colored::Colorize;

use weaver_model::LayerOrderError;
use weaver_pipeline::PipelineError;

/// Exit code of a run stopped with ^C.
pub const EXIT_CANCELLED: i32 = 130;

/// Reports a fatal error of the weaver and exits, instead of panicking.
pub trait NiceError<T> {
    /// Exit if the value is an error, printing the error chain preceded by the message returned
    /// by `f`. Otherwise return the content.
    fn nice_expect_with<S: Display + Send + Sync + 'static, F: FnOnce() -> S>(self, f: F) -> T;
}

impl<T> NiceError<T> for Result<T, Error> {
    fn nice_expect_with<S: Display + Send + Sync + 'static, F: FnOnce() -> S>(self, f: F) -> T {
        match self {
            Ok(x) => x,
            Err(e) => {
                let code = exit_code(&e);
                print_error(&e.context(f()));
                std::process::exit(code);
            }
        }
    }
}

/// A cancelled run is not a failure of the project.
fn exit_code(error: &Error) -> i32 {
    match error.downcast_ref::<PipelineError>() {
        Some(PipelineError::Cancelled { .. }) => EXIT_CANCELLED,
        _ => 1,
    }
}

/// What the user can do about some of the fatal errors.
fn hint(error: &Error) -> Option<String> {
    if let Some(e) = error.downcast_ref::<LayerOrderError>() {
        return Some(match e {
            LayerOrderError::Cycle { layer } => format!(
                "remove one of the `order` constraints mentioning {}",
                layer
            ),
            LayerOrderError::UnknownAspect { .. } | LayerOrderError::UnknownLayer { .. } => {
                "the `order` constraints can only mention the aspects and layers declared in \
                 `aspects`"
                    .to_string()
            }
            LayerOrderError::DuplicateAspect { name } => {
                format!("merge the declarations of {}", name)
            }
        });
    }
    match error.downcast_ref::<PipelineError>() {
        Some(PipelineError::Cancelled { .. }) => None,
        Some(_) => Some("this is a bug of an aspect or advice evaluator".to_string()),
        None => None,
    }
}

fn print_error(error: &Error) {
    debug!("{:?}", error);
    eprintln!("{}: {}", "Error".bold().bright_red(), error);
    for (i, cause) in error.chain().skip(1).enumerate() {
        eprintln!("  {}: {}", i + 1, cause);
    }
    if let Some(hint) = hint(error) {
        eprintln!("{}: {}", "Help".bold().cyan(), hint);
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Context};

    use super::*;

    #[test]
    fn test_exit_code() {
        let cancelled: Error = PipelineError::Cancelled {
            step: "Log (#0) at depth -1".into(),
        }
        .into();
        assert_eq!(exit_code(&cancelled.context("Weaving failed")), EXIT_CANCELLED);
        assert_eq!(exit_code(&anyhow!("Failed to read weave.yaml")), 1);
    }

    #[test]
    fn test_hint() {
        let cycle: Result<(), _> = Err(LayerOrderError::Cycle {
            layer: "Log".into(),
        });
        let err = cycle.context("Cannot order the aspect layers").unwrap_err();
        assert!(hint(&err).unwrap().contains("mentioning Log"));
        assert!(hint(&anyhow!("Invalid declarations")).is_none());
    }
}
