use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use weaver_diagnostics::{Diagnostic, DiagnosticContext};
use weaver_model::{
    Advice, AspectInstance, AspectLayerId, AspectLayerOrder, AspectSource, DeclarationId,
    DeclarationTree,
};

use crate::{
    AdviceEvaluator, Artifact, AspectEvaluator, CancellationToken, PipelineError, PipelineStep,
    PipelineStepId, TransformationStore, UNBOUND_DEPTH,
};

/// An aspect source that cannot be run by this scheduler, since the default layer of its aspect
/// class is not part of the layer order.
#[derive(Debug, Clone)]
pub struct DeferredSource {
    /// The source.
    pub source: Arc<dyn AspectSource>,
    /// The aspect class whose layer is unknown.
    pub aspect: String,
}

/// Everything produced by a weaving run.
#[derive(Debug)]
pub struct PipelineResult {
    /// The final snapshot of the tree, with all the introductions.
    pub tree: DeclarationTree,
    /// All the transformations produced.
    pub store: TransformationStore,
    /// All the problems found.
    pub diagnostics: DiagnosticContext,
    /// The aspect sources this scheduler could not run.
    pub deferred_sources: Vec<DeferredSource>,
    /// The additional artifacts produced by the advice.
    pub artifacts: Vec<Artifact>,
    /// The ids of the executed steps, in execution order.
    pub executed_steps: Vec<PipelineStepId>,
}

/// Where some new work falls with respect to the execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// In the step that is currently executing.
    Current,
    /// In a step that has not been executed yet.
    Future,
    /// In a step that is already closed, or that comes before the current one.
    Closed,
}

/// The scheduler of the aspect work.
///
/// The pending steps are kept in a sorted map and the lowest one is executed until the map is
/// empty. Since the new work can only go in the current step or after it, the map behaves like a
/// priority queue that only grows past the current position.
pub struct Scheduler<'a> {
    /// The current snapshot of the tree.
    tree: DeclarationTree,
    /// The global order of the layers of this run.
    order: AspectLayerOrder,
    aspect_evaluator: &'a dyn AspectEvaluator,
    advice_evaluator: &'a dyn AdviceEvaluator,
    cancellation: CancellationToken,

    /// The steps not executed yet.
    steps: BTreeMap<PipelineStepId, PipelineStep>,
    /// The step that is executing, if any.
    current: Option<PipelineStep>,
    /// The last step that has been closed.
    last_closed: Option<PipelineStepId>,
    /// The aspect classes already applied to each declaration. An aspect is applied at most
    /// once to the same declaration.
    applied: HashSet<(String, DeclarationId)>,

    store: TransformationStore,
    diagnostics: DiagnosticContext,
    deferred: Vec<DeferredSource>,
    artifacts: Vec<Artifact>,
    executed: Vec<PipelineStepId>,
}

impl<'a> Scheduler<'a> {
    /// Make a new scheduler working on `tree`, following the layer `order`.
    pub fn new(
        tree: DeclarationTree,
        order: AspectLayerOrder,
        aspect_evaluator: &'a dyn AspectEvaluator,
        advice_evaluator: &'a dyn AdviceEvaluator,
    ) -> Scheduler<'a> {
        Scheduler {
            tree,
            order,
            aspect_evaluator,
            advice_evaluator,
            cancellation: CancellationToken::new(),
            steps: BTreeMap::new(),
            current: None,
            last_closed: None,
            applied: HashSet::new(),
            store: TransformationStore::new(),
            diagnostics: DiagnosticContext::new(),
            deferred: Vec::new(),
            artifacts: Vec::new(),
            executed: Vec::new(),
        }
    }

    /// Use `token` for stopping the run from the outside.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The current snapshot of the tree.
    pub fn tree(&self) -> &DeclarationTree {
        &self.tree
    }

    /// The id of the step that is executing, if any.
    pub fn current_step(&self) -> Option<&PipelineStepId> {
        self.current.as_ref().map(|s| &s.id)
    }

    /// The ids of the steps still to execute, in execution order.
    pub fn pending_steps(&self) -> impl Iterator<Item = &PipelineStepId> {
        self.steps.keys()
    }

    /// Attach the aspect sources to the step at depth -1 of the default layer of each of their
    /// aspect classes. The sources of the aspect classes not in the layer order are deferred.
    pub fn add_aspect_sources(&mut self, sources: Vec<Arc<dyn AspectSource>>) {
        for source in sources {
            for aspect in source.aspect_classes() {
                let layer = AspectLayerId::default_layer(&aspect);
                let order_index = match self.order.order_index(&layer) {
                    Some(order_index) => order_index,
                    None => {
                        debug!(
                            "Deferring source {} of {}: the layer is not in this pipeline",
                            source.name(),
                            aspect
                        );
                        self.deferred.push(DeferredSource {
                            source: source.clone(),
                            aspect,
                        });
                        continue;
                    }
                };
                let id = PipelineStepId::new(layer, order_index, UNBOUND_DEPTH);
                match self.placement(&id) {
                    Placement::Closed => self.handle_late_source(source.clone(), aspect, id),
                    Placement::Current | Placement::Future => {
                        trace!("Source {} of {} added to {}", source.name(), aspect, id);
                        self.step_mut(id).sources.push((source.clone(), aspect));
                    }
                }
            }
        }
    }

    /// Add some aspect instances, each to the step of the default layer of its aspect class at
    /// the depth of its target. An instance that cannot be placed is a fatal error.
    pub fn add_aspect_instances(
        &mut self,
        instances: Vec<AspectInstance>,
    ) -> Result<(), PipelineError> {
        for instance in instances {
            let id = match self.instance_step(&instance) {
                Ok(id) => id,
                Err(reason) => {
                    return Err(PipelineError::UnplaceableAspectInstance {
                        instance: instance.uuid,
                        aspect: instance.aspect,
                        reason,
                    })
                }
            };
            if self.placement(&id) == Placement::Closed {
                return Err(PipelineError::UnplaceableAspectInstance {
                    instance: instance.uuid,
                    aspect: instance.aspect,
                    reason: format!("step {} is already closed", id),
                });
            }
            self.place_instance(id, instance);
        }
        Ok(())
    }

    /// Add an advice to the step of its layer at the depth of its target. Returns whether the
    /// advice has been accepted: an advice for a closed step is rejected with a diagnostic.
    pub fn add_advice(&mut self, advice: Advice) -> bool {
        let depth = match self.tree.depth_of(advice.target) {
            Some(depth) => depth,
            None => {
                self.diagnostics.add_diagnostic(
                    Diagnostic::error(format!(
                        "Advice {} targets the unknown declaration {}",
                        advice.uuid, advice.target
                    ))
                    .with_origin(advice.layer.to_string()),
                );
                return false;
            }
        };
        let order_index = match self.order.order_index(&advice.layer) {
            Some(order_index) => order_index,
            None => {
                self.diagnostics.add_diagnostic(
                    Diagnostic::error(format!(
                        "Advice for the unknown layer {} cannot be scheduled",
                        advice.layer
                    ))
                    .with_origin(advice.layer.to_string())
                    .with_location(self.tree.path(advice.target)),
                );
                return false;
            }
        };
        let id = PipelineStepId::new(advice.layer.clone(), order_index, depth);
        match self.placement(&id) {
            Placement::Closed => {
                let position = self
                    .position()
                    .map(|p| p.to_string())
                    .unwrap_or_default();
                warn!("Rejected advice for {}, the execution is at {}", id, position);
                self.diagnostics.add_diagnostic(
                    Diagnostic::error(format!(
                        "Cannot schedule {} advice in {}: the execution is already at {}",
                        advice.kind.as_str(),
                        id,
                        position
                    ))
                    .with_origin(advice.layer.to_string())
                    .with_location(self.tree.path(advice.target))
                    .with_help("advice can only target the current layer or a later one"),
                );
                false
            }
            Placement::Current | Placement::Future => {
                trace!("Advice {} added to {}", advice.uuid, id);
                self.step_mut(id).advice.push(advice);
                true
            }
        }
    }

    /// Execute all the steps, in order, until no work is left.
    pub fn execute(mut self) -> Result<PipelineResult, PipelineError> {
        info!(
            "Weaving {} declarations with {} layers",
            self.tree.len(),
            self.order.len()
        );
        while let Some((id, step)) = self.steps.pop_first() {
            if self.cancellation.is_cancelled() {
                info!("Weaving cancelled before {}", id);
                return Err(PipelineError::Cancelled {
                    step: id.to_string(),
                });
            }
            debug!("Executing step {}", id);
            self.current = Some(step);
            self.run_current_step()?;
            self.current = None;
            self.executed.push(id.clone());
            self.last_closed = Some(id);
        }
        info!(
            "Weaving done: {} steps, {} transformations, {} diagnostics",
            self.executed.len(),
            self.store.len(),
            self.diagnostics.len()
        );
        Ok(PipelineResult {
            tree: self.tree,
            store: self.store,
            diagnostics: self.diagnostics,
            deferred_sources: self.deferred,
            artifacts: self.artifacts,
            executed_steps: self.executed,
        })
    }

    /// Run the current step until it has no more pending work, including the work it added to
    /// itself while running.
    fn run_current_step(&mut self) -> Result<(), PipelineError> {
        loop {
            let (id, sources, instances, advice) = match self.current.as_mut() {
                Some(step) if step.has_pending_work() => (
                    step.id.clone(),
                    std::mem::take(&mut step.sources),
                    std::mem::take(&mut step.instances),
                    std::mem::take(&mut step.advice),
                ),
                _ => return Ok(()),
            };
            for (source, aspect) in sources {
                let instances = self.expand_source(source.as_ref(), &aspect);
                debug!(
                    "Source {} produced {} instances of {}",
                    source.name(),
                    instances.len(),
                    aspect
                );
                self.add_aspect_instances(instances)?;
            }
            for instance in instances {
                self.handle_instance(&instance);
            }
            if !advice.is_empty() {
                self.handle_advice(&id, advice)?;
            }
        }
    }

    /// Evaluate an aspect instance and schedule what it produced.
    fn handle_instance(&mut self, instance: &AspectInstance) {
        let result = self
            .aspect_evaluator
            .evaluate(instance, &self.tree, &self.order);
        self.diagnostics.extend(result.diagnostics);
        if !result.success {
            warn!(
                "Evaluation of {} on {} failed",
                instance.aspect,
                self.tree.path(instance.target)
            );
            return;
        }
        self.add_aspect_sources(result.aspect_sources);
        for advice in result.advice {
            self.add_advice(advice);
        }
    }

    /// Evaluate a batch of advice, fold the revised tree and store the transformations.
    fn handle_advice(
        &mut self,
        id: &PipelineStepId,
        batch: Vec<Advice>,
    ) -> Result<(), PipelineError> {
        debug!("Evaluating {} advice in {}", batch.len(), id);
        let result = self
            .advice_evaluator
            .evaluate(&batch, &self.tree, &self.order);
        self.diagnostics.extend(result.diagnostics);
        let revised = match result.tree {
            Some(revised) => {
                if revised.len() < self.tree.len() {
                    return Err(PipelineError::InconsistentSnapshot {
                        step: id.to_string(),
                    });
                }
                debug!(
                    "Step {} revised the tree: {} -> {} declarations",
                    id,
                    self.tree.len(),
                    revised.len()
                );
                revised
            }
            None => self.tree.clone(),
        };
        // every transformation must be about a declaration of the revised tree, which includes
        // the members introduced earlier in the same batch
        for transformation in result.observable.iter().chain(&result.non_observable) {
            if !revised.contains(transformation.target) {
                return Err(PipelineError::UnknownTransformationTarget {
                    advice: transformation.advice,
                    target: transformation.target,
                });
            }
        }
        if let Some(missing) = result
            .observable
            .iter()
            .find(|t| !revised.contains(t.subject()))
        {
            return Err(PipelineError::UnknownTransformationTarget {
                advice: missing.advice,
                target: missing.subject(),
            });
        }
        self.tree = revised;
        for transformation in result.observable.into_iter().chain(result.non_observable) {
            self.store.push(transformation);
        }
        self.artifacts.extend(result.artifacts);
        Ok(())
    }

    /// Handle a source whose step has already been executed. If the execution is still inside
    /// the layer of the source, its instances are expanded immediately and placed in the deeper
    /// steps of the layer.
    fn handle_late_source(
        &mut self,
        source: Arc<dyn AspectSource>,
        aspect: String,
        id: PipelineStepId,
    ) {
        let same_layer = matches!(&self.current, Some(step) if step.id.order_index == id.order_index);
        if !same_layer {
            warn!("Rejected source {} of {} for {}", source.name(), aspect, id);
            self.diagnostics.add_diagnostic(
                Diagnostic::error(format!(
                    "Cannot add the aspect source {} of {}: its layer has already been executed",
                    source.name(),
                    aspect
                ))
                .with_origin(id.layer.to_string()),
            );
            return;
        }
        let instances = self.expand_source(source.as_ref(), &aspect);
        debug!(
            "Late source {} produced {} instances of {}",
            source.name(),
            instances.len(),
            aspect
        );
        for instance in instances {
            let placed = match self.instance_step(&instance) {
                Ok(id) if self.placement(&id) != Placement::Closed => Ok(id),
                Ok(id) => Err(format!("step {} is already closed", id)),
                Err(reason) => Err(reason),
            };
            match placed {
                Ok(id) => self.place_instance(id, instance),
                Err(reason) => self.diagnostics.add_diagnostic(
                    Diagnostic::error(format!(
                        "Cannot apply {} produced by {}: {}",
                        instance.aspect,
                        source.name(),
                        reason
                    ))
                    .with_location(self.tree.path(instance.target)),
                ),
            }
        }
    }

    /// Put an instance in its step, unless the same aspect has already been applied to the
    /// same target.
    fn place_instance(&mut self, id: PipelineStepId, instance: AspectInstance) {
        if !self
            .applied
            .insert((instance.aspect.clone(), instance.target))
        {
            trace!(
                "{} already applied to {}, skipping",
                instance.aspect,
                self.tree.path(instance.target)
            );
            return;
        }
        trace!("Instance of {} on {} added to {}", instance.aspect, instance.target, id);
        self.step_mut(id).instances.push(instance);
    }

    /// The instances of a source, without the excluded ones.
    fn expand_source(&self, source: &dyn AspectSource, aspect: &str) -> Vec<AspectInstance> {
        let exclusions = source.get_exclusions(aspect, &self.tree);
        source
            .get_aspect_instances(aspect, &self.tree)
            .into_iter()
            .filter(|instance| {
                let excluded = exclusions
                    .iter()
                    .any(|excluded| self.tree.is_within(instance.target, *excluded));
                if excluded {
                    trace!(
                        "{} excluded from {}",
                        self.tree.path(instance.target),
                        aspect
                    );
                }
                !excluded
            })
            .collect()
    }

    /// The step an instance belongs to.
    fn instance_step(&self, instance: &AspectInstance) -> Result<PipelineStepId, String> {
        let layer = AspectLayerId::default_layer(&instance.aspect);
        let order_index = self
            .order
            .order_index(&layer)
            .ok_or_else(|| format!("the layer {} is not in this pipeline", layer))?;
        let depth = self
            .tree
            .depth_of(instance.target)
            .ok_or_else(|| format!("the target {} is not in the tree", instance.target))?;
        Ok(PipelineStepId::new(layer, order_index, depth))
    }

    /// The position of the execution: the executing step or the last closed one.
    fn position(&self) -> Option<&PipelineStepId> {
        self.current_step().or(self.last_closed.as_ref())
    }

    fn placement(&self, id: &PipelineStepId) -> Placement {
        match &self.current {
            Some(step) if step.id == *id => Placement::Current,
            Some(step) if *id < step.id => Placement::Closed,
            _ => match &self.last_closed {
                Some(last) if id <= last => Placement::Closed,
                _ => Placement::Future,
            },
        }
    }

    /// The step with the given id: the current one or a pending one, created if missing.
    fn step_mut(&mut self, id: PipelineStepId) -> &mut PipelineStep {
        match &mut self.current {
            Some(step) if step.id == id => step,
            _ => self
                .steps
                .entry(id.clone())
                .or_insert_with(|| PipelineStep::new(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;
    use speculoos::prelude::*;

    use weaver_model::{
        Accessor, AdviceKind, AspectClass, AspectLayerGraph, Body, Declaration, DeclarationKind,
        InstancePredecessor, IntroducedMember, OverrideStrategy, Signature, StaticAspectSource,
        Template, TransformationSemantic,
    };

    use super::*;
    use crate::{AdviceEvaluationResult, AspectEvaluationResult, TemplateAdviceEvaluator};

    type Script = Box<dyn Fn(&AspectInstance, &DeclarationTree) -> AspectEvaluationResult>;

    /// An aspect evaluator that runs a closure per aspect class and records the evaluations.
    #[derive(Default)]
    struct ScriptedEvaluator {
        scripts: HashMap<String, Script>,
        evaluated: RefCell<Vec<(String, DeclarationId)>>,
    }

    impl ScriptedEvaluator {
        fn with<F>(mut self, aspect: &str, script: F) -> Self
        where
            F: Fn(&AspectInstance, &DeclarationTree) -> AspectEvaluationResult + 'static,
        {
            self.scripts.insert(aspect.to_string(), Box::new(script));
            self
        }

        fn evaluated(&self) -> Vec<(String, DeclarationId)> {
            self.evaluated.borrow().clone()
        }
    }

    impl AspectEvaluator for ScriptedEvaluator {
        fn evaluate(
            &self,
            instance: &AspectInstance,
            tree: &DeclarationTree,
            _order: &AspectLayerOrder,
        ) -> AspectEvaluationResult {
            self.evaluated
                .borrow_mut()
                .push((instance.aspect.clone(), instance.target));
            match self.scripts.get(&instance.aspect) {
                Some(script) => script(instance, tree),
                None => AspectEvaluationResult::success(),
            }
        }
    }

    fn override_advice(
        instance: &AspectInstance,
        layer: AspectLayerId,
        target: DeclarationId,
    ) -> Advice {
        Advice::override_accessor(
            instance.uuid,
            target,
            layer,
            Accessor::Invoke,
            Template::parse("t", ["proceed"]),
        )
    }

    fn advising(
        layer: AspectLayerId,
        target: DeclarationId,
    ) -> impl Fn(&AspectInstance, &DeclarationTree) -> AspectEvaluationResult {
        move |instance, _| {
            let mut result = AspectEvaluationResult::success();
            result
                .advice
                .push(override_advice(instance, layer.clone(), target));
            result
        }
    }

    struct Fixture {
        tree: DeclarationTree,
        ty: DeclarationId,
        foo: DeclarationId,
        inner: DeclarationId,
        inner_bar: DeclarationId,
    }

    /// `App` (0) > `Service` (1) > `Foo` (2), `Inner` (2) > `Bar` (3)
    fn fixture() -> Fixture {
        let mut tree = DeclarationTree::new();
        let ns = tree.insert(None, Declaration::new("App", DeclarationKind::Namespace));
        let ty = tree.insert(Some(ns), Declaration::new("Service", DeclarationKind::Type));
        let foo = tree.insert(
            Some(ty),
            Declaration::new("Foo", DeclarationKind::Method)
                .with_body(Accessor::Invoke, Body::text(["emit foo"])),
        );
        let inner = tree.insert(Some(ty), Declaration::new("Inner", DeclarationKind::Type));
        let inner_bar = tree.insert(
            Some(inner),
            Declaration::new("Bar", DeclarationKind::Method)
                .with_body(Accessor::Invoke, Body::text(["emit bar"])),
        );
        Fixture {
            tree,
            ty,
            foo,
            inner,
            inner_bar,
        }
    }

    fn order(classes: &[AspectClass]) -> AspectLayerOrder {
        let mut graph = AspectLayerGraph::new();
        for class in classes {
            graph.add_aspect(class.clone());
        }
        graph.sort().unwrap()
    }

    fn keys(steps: &[PipelineStepId]) -> Vec<(usize, i32)> {
        steps.iter().map(|s| s.key()).collect()
    }

    fn source(name: &str, applications: &[(&str, DeclarationId)]) -> Vec<Arc<dyn AspectSource>> {
        let mut source = StaticAspectSource::new(name);
        for (aspect, target) in applications {
            source = source.with_application(*aspect, *target);
        }
        vec![Arc::new(source)]
    }

    #[test]
    fn test_execution_order() {
        let f = fixture();
        let order = order(&[
            AspectClass::new("A").with_layer("build"),
            AspectClass::new("B"),
        ]);
        let evaluator = ScriptedEvaluator::default()
            .with("A", advising(AspectLayerId::new("A", Some("build")), f.foo));
        let advice_evaluator = TemplateAdviceEvaluator::new();
        let mut scheduler = Scheduler::new(f.tree.clone(), order, &evaluator, &advice_evaluator);
        scheduler.add_aspect_sources(source("test", &[("B", f.ty), ("A", f.foo), ("A", f.ty)]));
        assert_eq!(
            scheduler.pending_steps().map(|s| s.key()).collect::<Vec<_>>(),
            vec![(0, -1), (2, -1)]
        );
        let result = scheduler.execute().unwrap();
        assert_eq!(
            keys(&result.executed_steps),
            vec![(0, -1), (0, 1), (0, 2), (1, 2), (2, -1), (2, 1)]
        );
        assert_eq!(
            evaluator.evaluated(),
            vec![
                ("A".to_string(), f.ty),
                ("A".to_string(), f.foo),
                ("B".to_string(), f.ty)
            ]
        );
        assert_eq!(result.store.len(), 2);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_closed_step_rejection() {
        let f = fixture();
        let order = order(&[
            AspectClass::new("A").with_layer("build"),
            AspectClass::new("B"),
        ]);
        // A:build comes before B, its steps are closed when B runs
        let evaluator = ScriptedEvaluator::default()
            .with("B", advising(AspectLayerId::new("A", Some("build")), f.foo));
        let advice_evaluator = TemplateAdviceEvaluator::new();
        let mut scheduler = Scheduler::new(f.tree.clone(), order, &evaluator, &advice_evaluator);
        scheduler.add_aspect_sources(source("test", &[("A", f.ty), ("B", f.ty)]));
        let result = scheduler.execute().unwrap();
        assert!(result.store.is_empty());
        assert_eq!(result.diagnostics.errors().count(), 1);
        let diagnostic = &result.diagnostics.diagnostics()[0];
        assert_that!(diagnostic.message()).contains("Cannot schedule override advice");
        assert_eq!(diagnostic.location(), Some("App.Service.Foo"));
        assert_eq!(diagnostic.origin(), Some("A:build"));
    }

    #[test]
    fn test_same_step_feed_in() {
        let f = fixture();
        let order = order(&[AspectClass::new("A")]);
        let (ty, foo) = (f.ty, f.foo);
        let evaluator = ScriptedEvaluator::default().with("A", move |instance, _| {
            let mut result = AspectEvaluationResult::success();
            // same layer and depth of the current step
            result
                .advice
                .push(override_advice(instance, AspectLayerId::default_layer("A"), foo));
            // same layer, lower depth: already closed
            result
                .advice
                .push(override_advice(instance, AspectLayerId::default_layer("A"), ty));
            result
        });
        let advice_evaluator = TemplateAdviceEvaluator::new();
        let mut scheduler = Scheduler::new(f.tree.clone(), order, &evaluator, &advice_evaluator);
        scheduler.add_aspect_sources(source("test", &[("A", foo)]));
        let result = scheduler.execute().unwrap();
        assert_eq!(keys(&result.executed_steps), vec![(0, -1), (0, 2)]);
        let targets: Vec<_> = result.store.iter().map(|t| t.target).collect();
        assert_eq!(targets, vec![foo]);
        assert_eq!(result.diagnostics.errors().count(), 1);
    }

    #[test]
    fn test_deeper_advice_same_layer() {
        // the current step is (5, 2) and an advice for the layer 5 targets a declaration at
        // depth 3: it's scheduled right after the current step
        let f = fixture();
        let classes: Vec<_> = (0..6).map(|i| AspectClass::new(format!("A{}", i))).collect();
        let order = order(&classes);
        let evaluator = ScriptedEvaluator::default()
            .with("A5", advising(AspectLayerId::default_layer("A5"), f.inner_bar));
        let advice_evaluator = TemplateAdviceEvaluator::new();
        let mut scheduler = Scheduler::new(f.tree.clone(), order, &evaluator, &advice_evaluator);
        scheduler.add_aspect_sources(source("test", &[("A5", f.foo)]));
        let result = scheduler.execute().unwrap();
        assert_eq!(keys(&result.executed_steps), vec![(5, -1), (5, 2), (5, 3)]);
        assert!(result.diagnostics.is_empty());
        let targets: Vec<_> = result.store.iter().map(|t| t.target).collect();
        assert_eq!(targets, vec![f.inner_bar]);
    }

    #[test]
    fn test_deferred_sources() {
        let f = fixture();
        let order = order(&[AspectClass::new("A")]);
        let evaluator = ScriptedEvaluator::default();
        let advice_evaluator = TemplateAdviceEvaluator::new();
        let mut scheduler = Scheduler::new(f.tree.clone(), order, &evaluator, &advice_evaluator);
        scheduler.add_aspect_sources(source("test", &[("A", f.ty), ("Later", f.ty)]));
        let result = scheduler.execute().unwrap();
        assert_eq!(result.deferred_sources.len(), 1);
        assert_eq!(result.deferred_sources[0].aspect, "Later");
        assert!(result.diagnostics.is_empty());
        assert_eq!(evaluator.evaluated(), vec![("A".to_string(), f.ty)]);
    }

    #[test]
    fn test_exclusions() {
        let f = fixture();
        let order = order(&[AspectClass::new("A")]);
        let evaluator = ScriptedEvaluator::default();
        let advice_evaluator = TemplateAdviceEvaluator::new();
        let mut scheduler = Scheduler::new(f.tree.clone(), order, &evaluator, &advice_evaluator);
        scheduler.add_aspect_sources(vec![Arc::new(
            StaticAspectSource::new("test")
                .with_application("A", f.foo)
                .with_application("A", f.inner_bar)
                .with_exclusion("A", f.inner),
        )]);
        scheduler.execute().unwrap();
        assert_eq!(evaluator.evaluated(), vec![("A".to_string(), f.foo)]);
    }

    #[test]
    fn test_child_sources() {
        let f = fixture();
        let order = order(&[AspectClass::new("A"), AspectClass::new("B")]);
        let (ty, foo, inner_bar) = (f.ty, f.foo, f.inner_bar);
        let evaluator = ScriptedEvaluator::default().with("A", move |instance, _| {
            let mut result = AspectEvaluationResult::success();
            if instance.target == foo {
                result.aspect_sources.push(Arc::new(
                    StaticAspectSource::new("child")
                        .with_application("B", foo)
                        .with_application("A", inner_bar)
                        .with_application("A", ty)
                        .with_application("A", foo),
                ));
            }
            result
        });
        let advice_evaluator = TemplateAdviceEvaluator::new();
        let mut scheduler = Scheduler::new(f.tree.clone(), order, &evaluator, &advice_evaluator);
        scheduler.add_aspect_sources(source("test", &[("A", foo)]));
        let result = scheduler.execute().unwrap();
        // the child source runs while A is at depth 2: Inner.Bar (depth 3) can still get A,
        // Service (depth 1) cannot, and Foo already has it
        assert_eq!(
            evaluator.evaluated(),
            vec![
                ("A".to_string(), foo),
                ("A".to_string(), inner_bar),
                ("B".to_string(), foo)
            ]
        );
        assert_eq!(result.diagnostics.errors().count(), 1);
        assert_eq!(
            result.diagnostics.diagnostics()[0].location(),
            Some("App.Service")
        );
    }

    #[test]
    fn test_failed_evaluation_drops_advice() {
        let f = fixture();
        let order = order(&[AspectClass::new("A")]);
        let evaluator = ScriptedEvaluator::default().with("A", |instance, _| {
            let mut result = AspectEvaluationResult::failure(Diagnostic::error("nope"));
            result.advice.push(override_advice(
                instance,
                AspectLayerId::default_layer("A"),
                instance.target,
            ));
            result
        });
        let advice_evaluator = TemplateAdviceEvaluator::new();
        let mut scheduler = Scheduler::new(f.tree.clone(), order, &evaluator, &advice_evaluator);
        scheduler.add_aspect_sources(source("test", &[("A", f.foo)]));
        let result = scheduler.execute().unwrap();
        assert!(result.store.is_empty());
        assert_eq!(result.diagnostics.errors().count(), 1);
    }

    #[test]
    fn test_unplaceable_instance_is_fatal() {
        let f = fixture();
        let order = order(&[AspectClass::new("A")]);
        let evaluator = ScriptedEvaluator::default();
        let advice_evaluator = TemplateAdviceEvaluator::new();
        let mut scheduler = Scheduler::new(f.tree.clone(), order, &evaluator, &advice_evaluator);
        let instance = AspectInstance::new(
            "Unknown",
            f.foo,
            InstancePredecessor::Source {
                name: "test".into(),
            },
        );
        let uuid = instance.uuid;
        let err = scheduler.add_aspect_instances(vec![instance]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnplaceableAspectInstance { instance, .. } if instance == uuid
        ));
    }

    #[test]
    fn test_cancellation() {
        let f = fixture();
        let order = order(&[AspectClass::new("A")]);
        let evaluator = ScriptedEvaluator::default();
        let advice_evaluator = TemplateAdviceEvaluator::new();
        let token = CancellationToken::new();
        let mut scheduler = Scheduler::new(f.tree.clone(), order, &evaluator, &advice_evaluator)
            .with_cancellation(token.clone());
        scheduler.add_aspect_sources(source("test", &[("A", f.foo)]));
        token.cancel();
        let err = scheduler.execute().unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { .. }));
        assert!(evaluator.evaluated().is_empty());
    }

    /// Returns a revised tree that lost all the declarations.
    struct ShrinkingAdviceEvaluator;

    impl AdviceEvaluator for ShrinkingAdviceEvaluator {
        fn evaluate(
            &self,
            _advice: &[Advice],
            _tree: &DeclarationTree,
            _order: &AspectLayerOrder,
        ) -> AdviceEvaluationResult {
            AdviceEvaluationResult {
                tree: Some(DeclarationTree::new()),
                ..Default::default()
            }
        }
    }

    #[test]
    fn test_inconsistent_snapshot_is_fatal() {
        let f = fixture();
        let order = order(&[AspectClass::new("A")]);
        let evaluator = ScriptedEvaluator::default().with("A", |instance, _| {
            let mut result = AspectEvaluationResult::success();
            result.advice.push(Advice::new(
                instance.uuid,
                instance.target,
                AspectLayerId::default_layer("A"),
                AdviceKind::Redirect {
                    to: instance.target,
                },
            ));
            result
        });
        let mut scheduler =
            Scheduler::new(f.tree.clone(), order, &evaluator, &ShrinkingAdviceEvaluator);
        scheduler.add_aspect_sources(source("test", &[("A", f.foo)]));
        let err = scheduler.execute().unwrap_err();
        assert!(matches!(err, PipelineError::InconsistentSnapshot { .. }));
    }

    fn random_script(
        layers: Vec<AspectLayerId>,
        targets: Vec<DeclarationId>,
        rng: Rc<RefCell<fastrand::Rng>>,
        produced: Rc<Cell<usize>>,
    ) -> impl Fn(&AspectInstance, &DeclarationTree) -> AspectEvaluationResult {
        move |instance, _| {
            let mut rng = rng.borrow_mut();
            let mut result = AspectEvaluationResult::success();
            for _ in 0..rng.usize(1..4) {
                let layer = layers[rng.usize(..layers.len())].clone();
                let target = targets[rng.usize(..targets.len())];
                result.advice.push(Advice::new(
                    instance.uuid,
                    target,
                    layer,
                    AdviceKind::AddResource {
                        name: target.to_string(),
                        content: String::new(),
                    },
                ));
            }
            produced.set(produced.get() + result.advice.len());
            result
        }
    }

    /// Aspects adding advice at random layers and depths: the steps are always executed in
    /// increasing order and every advice is either executed or rejected.
    #[test]
    fn test_total_order_random() {
        for seed in 0..20 {
            let f = fixture();
            let order = order(&[
                AspectClass::new("A").with_layer("x"),
                AspectClass::new("B").with_layer("x").with_layer("y"),
                AspectClass::new("C"),
            ]);
            let layers: Vec<AspectLayerId> = order.iter().map(|l| l.id.clone()).collect();
            let targets: Vec<DeclarationId> = f.tree.iter().map(|d| d.id).collect();
            let rng = Rc::new(RefCell::new(fastrand::Rng::with_seed(seed)));
            let produced = Rc::new(Cell::new(0));
            let mut evaluator = ScriptedEvaluator::default();
            let mut source = StaticAspectSource::new("random");
            for aspect in ["A", "B", "C"] {
                evaluator = evaluator.with(
                    aspect,
                    random_script(layers.clone(), targets.clone(), rng.clone(), produced.clone()),
                );
                for target in &targets {
                    if rng.borrow_mut().bool() {
                        source = source.with_application(aspect, *target);
                    }
                }
            }
            let advice_evaluator = TemplateAdviceEvaluator::new();
            let mut scheduler =
                Scheduler::new(f.tree.clone(), order.clone(), &evaluator, &advice_evaluator);
            scheduler.add_aspect_sources(vec![Arc::new(source)]);
            let result = scheduler.execute().unwrap();

            for pair in result.executed_steps.windows(2) {
                assert!(pair[0] < pair[1], "{} executed before {}", pair[0], pair[1]);
            }
            assert_eq!(
                result.artifacts.len() + result.diagnostics.errors().count(),
                produced.get(),
                "seed {}",
                seed
            );
            assert!(result.store.is_empty());
        }
    }

    #[test]
    fn test_override_member_introduced_in_same_step() {
        let f = fixture();
        let order = order(&[AspectClass::new("A").with_layer("intro")]);
        let layer = AspectLayerId::new("A", Some("intro"));
        let evaluator = ScriptedEvaluator::default().with("A", move |instance, _| {
            let introduce = |when_exists, lines: Vec<&str>| {
                Advice::new(
                    instance.uuid,
                    instance.target,
                    layer.clone(),
                    AdviceKind::Introduce {
                        member: IntroducedMember::new("Baz", DeclarationKind::Method)
                            .with_template(Accessor::Invoke, Template::parse("baz", lines)),
                        when_exists,
                    },
                )
            };
            let mut result = AspectEvaluationResult::success();
            result.advice.push(introduce(OverrideStrategy::Fail, vec!["emit baz"]));
            result.advice.push(introduce(
                OverrideStrategy::Override,
                vec!["emit wrapped", "proceed"],
            ));
            result
        });
        let advice_evaluator = TemplateAdviceEvaluator::new();
        let mut scheduler = Scheduler::new(f.tree.clone(), order, &evaluator, &advice_evaluator);
        scheduler.add_aspect_sources(source("test", &[("A", f.ty)]));
        let result = scheduler.execute().unwrap();
        assert!(result.diagnostics.is_empty());
        let baz = result
            .tree
            .find_member(f.ty, "Baz", DeclarationKind::Method, &Signature::new())
            .unwrap();
        assert!(!f.tree.contains(baz));
        let semantics: Vec<_> = result.store.for_subject(baz).map(|t| t.semantic()).collect();
        assert_eq!(
            semantics,
            vec![
                TransformationSemantic::Introduction,
                TransformationSemantic::Override
            ]
        );
    }
}
