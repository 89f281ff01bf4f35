use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use weaver_model::{Advice, AspectInstance, AspectLayerId, AspectSource};

/// The depth of the steps that own the aspect sources, which are not bound to any declaration
/// yet. It comes before the depth of every declaration.
pub const UNBOUND_DEPTH: i32 = -1;

/// The key of a [`PipelineStep`].
///
/// The ids are totally ordered by the global order index of the layer and then by depth. Two ids
/// with the same order index and depth denote the same step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStepId {
    /// The layer of the step, kept for display.
    pub layer: AspectLayerId,
    /// The global order index of `layer`.
    pub order_index: usize,
    /// The depth of the declarations the work of this step is about.
    pub depth: i32,
}

impl PipelineStepId {
    /// Make a new step id.
    pub fn new(layer: AspectLayerId, order_index: usize, depth: i32) -> PipelineStepId {
        PipelineStepId {
            layer,
            order_index,
            depth,
        }
    }

    /// The pair that defines the order of the steps.
    pub fn key(&self) -> (usize, i32) {
        (self.order_index, self.depth)
    }
}

impl PartialEq for PipelineStepId {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for PipelineStepId {}

impl PartialOrd for PipelineStepId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PipelineStepId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Display for PipelineStepId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (#{}) at depth {}", self.layer, self.order_index, self.depth)
    }
}

/// The work accumulated for a [`PipelineStepId`]. All the lists keep the insertion order.
#[derive(Debug)]
pub struct PipelineStep {
    /// The key of this step.
    pub id: PipelineStepId,
    /// The aspect sources to expand, each with the aspect class to ask for.
    pub(crate) sources: Vec<(Arc<dyn AspectSource>, String)>,
    /// The aspect instances to evaluate.
    pub(crate) instances: Vec<AspectInstance>,
    /// The advice to evaluate.
    pub(crate) advice: Vec<Advice>,
}

impl PipelineStep {
    /// Make a new empty step.
    pub fn new(id: PipelineStepId) -> PipelineStep {
        PipelineStep {
            id,
            sources: Vec::new(),
            instances: Vec::new(),
            advice: Vec::new(),
        }
    }

    /// Whether there is still some work to do in this step.
    pub fn has_pending_work(&self) -> bool {
        !self.sources.is_empty() || !self.instances.is_empty() || !self.advice.is_empty()
    }

    /// The advice waiting in this step.
    pub fn advice(&self) -> &[Advice] {
        &self.advice
    }

    /// The aspect instances waiting in this step.
    pub fn instances(&self) -> &[AspectInstance] {
        &self.instances
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_id_order() {
        let a = PipelineStepId::new(AspectLayerId::default_layer("A"), 0, 3);
        let b = PipelineStepId::new(AspectLayerId::new("A", Some("build")), 1, UNBOUND_DEPTH);
        let c = PipelineStepId::new(AspectLayerId::new("A", Some("build")), 1, 2);
        let c2 = PipelineStepId::new(AspectLayerId::default_layer("B"), 1, 2);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(c, c2);
        assert_eq!(c.to_string(), "A:build (#1) at depth 2");
    }
}
