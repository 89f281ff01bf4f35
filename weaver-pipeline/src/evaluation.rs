use std::sync::Arc;

use serde::{Deserialize, Serialize};

use weaver_diagnostics::Diagnostic;
use weaver_model::{
    Advice, AspectInstance, AspectLayerId, AspectLayerOrder, AspectSource, DeclarationTree,
    Transformation,
};

/// An additional file produced by a run, next to the linked output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// The name of the artifact.
    pub name: String,
    /// The content of the artifact.
    pub content: String,
    /// The layer that produced it.
    pub layer: AspectLayerId,
}

/// The outcome of the evaluation of an aspect instance.
#[derive(Debug, Default)]
pub struct AspectEvaluationResult {
    /// Whether the evaluation succeeded. The sources and the advice of a failed evaluation are
    /// discarded.
    pub success: bool,
    /// The problems found while evaluating.
    pub diagnostics: Vec<Diagnostic>,
    /// The new aspect sources discovered by the instance.
    pub aspect_sources: Vec<Arc<dyn AspectSource>>,
    /// The advice produced by the instance.
    pub advice: Vec<Advice>,
}

impl AspectEvaluationResult {
    /// A successful evaluation that produced nothing.
    pub fn success() -> AspectEvaluationResult {
        AspectEvaluationResult {
            success: true,
            ..Default::default()
        }
    }

    /// A failed evaluation.
    pub fn failure(diagnostic: Diagnostic) -> AspectEvaluationResult {
        AspectEvaluationResult {
            success: false,
            diagnostics: vec![diagnostic],
            ..Default::default()
        }
    }
}

/// The outcome of the evaluation of the advice of a step.
#[derive(Debug, Default)]
pub struct AdviceEvaluationResult {
    /// The revised snapshot of the tree, present when some transformation is observable. It must
    /// contain all the declarations of the tree passed to the evaluator.
    pub tree: Option<DeclarationTree>,
    /// The transformations that changed the tree.
    pub observable: Vec<Transformation>,
    /// The transformations visible only to the linker.
    pub non_observable: Vec<Transformation>,
    /// The problems found while evaluating.
    pub diagnostics: Vec<Diagnostic>,
    /// The artifacts produced by the advice.
    pub artifacts: Vec<Artifact>,
}

/// Evaluates the aspect instances, in the default layer of their aspect class.
pub trait AspectEvaluator {
    /// Evaluate an instance against the current snapshot of the tree.
    fn evaluate(
        &self,
        instance: &AspectInstance,
        tree: &DeclarationTree,
        order: &AspectLayerOrder,
    ) -> AspectEvaluationResult;
}

/// Evaluates all the advice accumulated in a step.
pub trait AdviceEvaluator {
    /// Evaluate the advice, in insertion order, against the current snapshot of the tree.
    fn evaluate(
        &self,
        advice: &[Advice],
        tree: &DeclarationTree,
        order: &AspectLayerOrder,
    ) -> AdviceEvaluationResult;
}
