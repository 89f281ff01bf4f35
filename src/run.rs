use anyhow::Error;

use weaver_pipeline::CancellationToken;

use crate::config::Project;
use crate::opt::Opt;
use crate::ui::{print_result, TraceReport};
use crate::weave::{weave, WeaveOptions};

/// Weave the project of the command line and print the result. Returns whether the weaving
/// completed without errors.
pub fn main_weave(opt: Opt, cancellation: CancellationToken) -> Result<bool, Error> {
    let project = Project::from_file(&opt.project)?;
    let options = WeaveOptions {
        num_workers: opt.num_cores,
        cancellation,
    };
    let result = weave(&project, &options)?;

    let traces: Vec<_> = opt
        .trace
        .iter()
        .map(|target| match result.trace(&target.member, target.accessor) {
            Ok(markers) => TraceReport {
                target: target.to_string(),
                markers: Some(markers),
                error: None,
            },
            Err(e) => TraceReport {
                target: target.to_string(),
                markers: None,
                error: Some(format!("{:#}", e)),
            },
        })
        .collect();
    let mut stdout = std::io::stdout().lock();
    print_result(&mut stdout, opt.ui, &result, &traces)?;
    Ok(!result.has_errors() && traces.iter().all(|t| t.error.is_none()))
}
