use anyhow::{anyhow, Context, Error};
use serde::Serialize;

use weaver_diagnostics::DiagnosticContext;
use weaver_linker::{CallTracer, LinkedOutput, Linker};
use weaver_model::{Accessor, DeclarationTree};
use weaver_pipeline::{Artifact, CancellationToken, Scheduler, TemplateAdviceEvaluator};

use crate::aspects::DeclarativeAspectEvaluator;
use crate::config::Project;

/// How to run a weaving.
#[derive(Debug, Clone, Default)]
pub struct WeaveOptions {
    /// The number of linker workers, one per CPU if missing.
    pub num_workers: Option<usize>,
    /// Stops the run at the next step boundary when cancelled.
    pub cancellation: CancellationToken,
}

/// An aspect source that could not be run since its aspect class is not part of the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeferredAspect {
    pub source: String,
    pub aspect: String,
}

/// Everything produced by weaving a project.
#[derive(Debug, Clone, Serialize)]
pub struct WeaveResult {
    /// The final declaration tree, with all the introduced members.
    #[serde(skip)]
    pub tree: DeclarationTree,
    pub output: LinkedOutput,
    pub diagnostics: DiagnosticContext,
    pub artifacts: Vec<Artifact>,
    pub deferred_sources: Vec<DeferredAspect>,
    /// The steps of the pipeline, in execution order.
    pub executed_steps: Vec<String>,
}

impl WeaveResult {
    /// Whether some error has been reported.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    /// The markers emitted calling an accessor of a linked member, given its dotted path.
    pub fn trace(&self, member: &str, accessor: Accessor) -> Result<Vec<String>, Error> {
        // the names of the members may contain dots, like `.ctor`
        let (ty, name) = self
            .output
            .types
            .iter()
            .filter_map(|t| {
                let name = member.strip_prefix(t.path.as_str())?.strip_prefix('.')?;
                Some((t, name))
            })
            .find(|(t, name)| t.member(name).is_some())
            .ok_or_else(|| anyhow!("Unknown member {}", member))?;
        CallTracer::new(ty)
            .trace(name, accessor)
            .with_context(|| format!("Cannot trace {}", member))
    }
}

/// Weave a project: run all the aspects and link the transformations they produced.
///
/// The problems of the aspects are reported in the diagnostics of the result. An error is
/// returned only when the run cannot start or is aborted.
pub fn weave(project: &Project, options: &WeaveOptions) -> Result<WeaveResult, Error> {
    let tree = project.build_tree().context("Invalid declarations")?;
    let order = project.layer_order()?;
    let sources = project.aspect_sources(&tree)?;
    info!(
        "Weaving {} types with {} aspect layers",
        tree.types().count(),
        order.len()
    );

    let aspect_evaluator = DeclarativeAspectEvaluator::new(project);
    let advice_evaluator = TemplateAdviceEvaluator::new();
    let mut scheduler = Scheduler::new(tree, order.clone(), &aspect_evaluator, &advice_evaluator)
        .with_cancellation(options.cancellation.clone());
    scheduler.add_aspect_sources(sources);
    let pipeline = scheduler.execute().context("Weaving failed")?;
    debug!(
        "The pipeline executed {} steps and produced {} transformations",
        pipeline.executed_steps.len(),
        pipeline.store.len()
    );

    let num_workers = options.num_workers.unwrap_or_else(num_cpus::get);
    let linked = Linker::new(&pipeline.tree, &pipeline.store, &order)
        .with_workers(num_workers)
        .link();

    let mut diagnostics = pipeline.diagnostics;
    diagnostics.extend(linked.diagnostics);
    let deferred_sources = pipeline
        .deferred_sources
        .iter()
        .map(|d| DeferredAspect {
            source: d.source.name().to_string(),
            aspect: d.aspect.clone(),
        })
        .collect();
    Ok(WeaveResult {
        output: linked.output,
        diagnostics,
        artifacts: pipeline.artifacts,
        deferred_sources,
        executed_steps: pipeline
            .executed_steps
            .iter()
            .map(|s| s.to_string())
            .collect(),
        tree: pipeline.tree,
    })
}
