//! Scheduling of the aspect work.
//!
//! The work of a weaving run is not known upfront: evaluating an aspect instance produces
//! advice and more aspect sources, which in turn produce more work. This crate keeps all the
//! pending work inside a [`Scheduler`], grouped into [`PipelineStep`]s, each bound to a
//! [`PipelineStepId`]: the pair of an aspect layer and a declaration depth.
//!
//! The steps are executed in the total order of their ids: first by the global order of the
//! layer, then by depth. In this way, within the same layer, the aspects applied to a type run
//! before the ones applied to its members and can discover more work for them.
//!
//! ## Placement rules
//!
//! While a step is executing, new work can be added:
//! - to a step that comes later: it's added (creating the step if needed);
//! - to the executing step itself: it's run before the step is closed;
//! - to a step that comes earlier, or that is already closed: the work is rejected. For advice
//!   and aspect sources this is a diagnostic and the run continues, for aspect instances this is
//!   a fatal [`PipelineError`].
//!
//! Aspect sources whose layer is not known to the order of the scheduler are not an error: they
//! are reported back in [`PipelineResult::deferred_sources`].
//!
//! The actual evaluation of the work is delegated to an [`AspectEvaluator`] and an
//! [`AdviceEvaluator`]; [`TemplateAdviceEvaluator`] is the default implementation of the latter.

#![deny(missing_docs)]

#[macro_use]
extern crate log;

mod advice_evaluator;
mod cancellation;
mod error;
mod evaluation;
mod scheduler;
mod step;
mod store;

pub use advice_evaluator::TemplateAdviceEvaluator;
pub use cancellation::CancellationToken;
pub use error::PipelineError;
pub use evaluation::{
    AdviceEvaluationResult, AdviceEvaluator, Artifact, AspectEvaluationResult, AspectEvaluator,
};
pub use scheduler::{DeferredSource, PipelineResult, Scheduler};
pub use step::{PipelineStep, PipelineStepId, UNBOUND_DEPTH};
pub use store::TransformationStore;
