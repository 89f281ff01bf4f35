use thiserror::Error;
use uuid::Uuid;

use weaver_model::DeclarationId;

/// A fatal error of the scheduler. These errors denote a defect in one of the components feeding
/// the scheduler, or an external request to stop; the run is aborted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// An aspect instance produced by an aspect source cannot be placed in any step.
    #[error("aspect instance {instance} of {aspect} cannot be placed: {reason}")]
    UnplaceableAspectInstance {
        /// The identifier of the instance.
        instance: Uuid,
        /// The aspect class of the instance.
        aspect: String,
        /// Why the instance cannot be placed.
        reason: String,
    },
    /// An advice evaluator produced a transformation whose target is not in the snapshot it was
    /// given.
    #[error("transformation of advice {advice} targets {target}, which is not in the current tree")]
    UnknownTransformationTarget {
        /// The advice that produced the transformation.
        advice: Uuid,
        /// The missing target.
        target: DeclarationId,
    },
    /// An advice evaluator returned a revised tree that is not an extension of the current one.
    #[error("the tree revised by step {step} is not an extension of the current one")]
    InconsistentSnapshot {
        /// The step that produced the tree.
        step: String,
    },
    /// The run has been cancelled from the outside.
    #[error("weaving cancelled before step {step}")]
    Cancelled {
        /// The first step that has not been executed.
        step: String,
    },
}
