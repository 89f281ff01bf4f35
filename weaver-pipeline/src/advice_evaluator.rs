use std::collections::BTreeMap;

use weaver_diagnostics::Diagnostic;
use weaver_model::{
    Accessor, Advice, AdviceKind, AspectLayerOrder, ContractDirection, Declaration,
    DeclarationId, DeclarationKind, DeclarationTree, Implementation, IntroducedMember, Observability,
    OverrideStrategy, Template, TemplateLine, Transformation, TransformationKind,
};

use crate::{AdviceEvaluationResult, AdviceEvaluator, Artifact};

/// The default [`AdviceEvaluator`]: it turns each advice into the corresponding transformation.
///
/// Introductions are applied to a revised copy of the tree, so the advice later in the same
/// batch see the members introduced by the previous ones. The conflict with an existing member
/// is resolved with the [`OverrideStrategy`] of the advice.
#[derive(Debug, Default)]
pub struct TemplateAdviceEvaluator;

impl TemplateAdviceEvaluator {
    /// Make a new evaluator.
    pub fn new() -> TemplateAdviceEvaluator {
        TemplateAdviceEvaluator
    }
}

/// The state of the evaluation of a batch.
struct Evaluation<'t> {
    tree: &'t DeclarationTree,
    revised: Option<DeclarationTree>,
    result: AdviceEvaluationResult,
}

impl<'t> Evaluation<'t> {
    /// The most recent snapshot of the tree.
    fn current(&self) -> &DeclarationTree {
        self.revised.as_ref().unwrap_or(self.tree)
    }

    fn error(&mut self, advice: &Advice, message: String) {
        let location = self.current().path(advice.target);
        self.result.diagnostics.push(
            Diagnostic::error(message)
                .with_origin(advice.layer.to_string())
                .with_location(location),
        );
    }

    fn non_observable(&mut self, advice: &Advice, kind: TransformationKind) {
        self.result.non_observable.push(Transformation::from_advice(
            advice,
            Observability::None,
            kind,
        ));
    }

    fn evaluate(&mut self, advice: &Advice) {
        if !self.tree.contains(advice.target) {
            self.error(
                advice,
                format!(
                    "{} advice targets an unknown declaration {}",
                    advice.kind.as_str(),
                    advice.target
                ),
            );
            return;
        }
        match &advice.kind {
            AdviceKind::Override { templates } => self.evaluate_override(advice, templates.clone()),
            AdviceKind::Introduce {
                member,
                when_exists,
            } => self.evaluate_introduction(advice, member, *when_exists),
            AdviceKind::AddContract {
                accessor,
                direction,
                template,
            } => {
                let template = contract_template(template, *direction);
                let mut templates = BTreeMap::new();
                templates.insert(*accessor, template);
                self.evaluate_override(advice, templates);
            }
            AdviceKind::Redirect { to } => self.evaluate_redirect(advice, *to),
            AdviceKind::AddResource { name, content } => {
                self.result.artifacts.push(Artifact {
                    name: name.clone(),
                    content: content.clone(),
                    layer: advice.layer.clone(),
                });
            }
        }
    }

    fn evaluate_override(&mut self, advice: &Advice, templates: BTreeMap<Accessor, Template>) {
        self.override_member(advice, advice.target, templates);
    }

    /// Override `target`, which may differ from the target of the advice when an introduction
    /// overrides an existing member.
    fn override_member(
        &mut self,
        advice: &Advice,
        target: DeclarationId,
        templates: BTreeMap<Accessor, Template>,
    ) {
        let target = match self.current().get(target) {
            Some(target) => target,
            None => return,
        };
        if !target.kind.is_overridable() {
            let message = format!("Cannot override the {} {}", target.kind, target.name);
            self.error(advice, message);
            return;
        }
        let available = if target.accessor_list().is_empty() {
            target.kind.accessors().to_vec()
        } else {
            target.accessor_list()
        };
        if let Some(accessor) = templates.keys().find(|a| !available.contains(a)) {
            let message = format!(
                "The {} {} has no {} accessor to override",
                target.kind, target.name, accessor
            );
            self.error(advice, message);
            return;
        }
        if templates.is_empty() {
            warn!("Override advice {} without templates, ignoring", advice.uuid);
            return;
        }
        let target = target.id;
        self.result.non_observable.push(
            Transformation::from_advice(
                advice,
                Observability::None,
                TransformationKind::Override { templates },
            )
            .with_target(target),
        );
    }

    fn evaluate_redirect(&mut self, advice: &Advice, to: DeclarationId) {
        let current = self.current();
        let same_type = match (current.declaring_type(advice.target), current.declaring_type(to)) {
            (Some(a), Some(b)) => a.id == b.id,
            _ => false,
        };
        let same_kind = match (current.get(advice.target), current.get(to)) {
            (Some(a), Some(b)) => a.kind == b.kind && a.id != b.id,
            _ => false,
        };
        if !same_type || !same_kind {
            let message = format!(
                "Cannot redirect to {}: it must be another member of the same kind in the same type",
                current.path(to)
            );
            self.error(advice, message);
            return;
        }
        self.non_observable(advice, TransformationKind::Redirect { to });
    }

    fn evaluate_introduction(
        &mut self,
        advice: &Advice,
        member: &IntroducedMember,
        when_exists: OverrideStrategy,
    ) {
        let current = self.current();
        match current.get(advice.target) {
            Some(ty) if ty.kind == DeclarationKind::Type => {}
            _ => {
                let message = format!("Cannot introduce {}: the target is not a type", member.name);
                self.error(advice, message);
                return;
            }
        }
        let existing =
            current.find_member(advice.target, &member.name, member.kind, &member.signature);
        let hides = match (existing, when_exists) {
            (None, _) => None,
            (Some(_), OverrideStrategy::Fail) => {
                let message = format!(
                    "Cannot introduce the {} {}: a member with the same signature already exists",
                    member.kind, member.name
                );
                self.error(advice, message);
                return;
            }
            (Some(existing), OverrideStrategy::Ignore) => {
                debug!(
                    "Introduction of {} ignored, {} already exists",
                    member.name,
                    self.current().path(existing)
                );
                return;
            }
            (Some(existing), OverrideStrategy::Override) => {
                let existing_kind = self.current().get(existing).map(|d| d.kind);
                if existing_kind != Some(member.kind) {
                    let message = format!(
                        "Cannot override {} with the introduced {}",
                        self.current().path(existing),
                        member.kind
                    );
                    self.error(advice, message);
                    return;
                }
                self.override_member(advice, existing, member.templates.clone());
                return;
            }
            (Some(existing), OverrideStrategy::New) => Some(existing),
        };

        let mut declaration = Declaration::new(&member.name, member.kind)
            .with_signature(member.signature.clone())
            .with_accessibility(member.accessibility)
            .introduced_by(advice.layer.clone());
        declaration.hides = hides;
        for accessor in member.kind.accessors() {
            let implementation = if member.is_auto {
                Some(Implementation::Auto)
            } else if member.templates.contains_key(accessor)
                || member.kind.accessors().len() == 1
            {
                Some(Implementation::Introduced)
            } else {
                None
            };
            if let Some(implementation) = implementation {
                declaration.accessors.insert(*accessor, implementation);
            }
        }
        let tree = self.tree;
        let revised = self.revised.get_or_insert_with(|| tree.clone());
        let id = revised.insert(Some(advice.target), declaration);
        debug!("Introduced {} as {}", revised.path(id), id);
        self.result.observable.push(Transformation::from_advice(
            advice,
            Observability::Observable,
            TransformationKind::Introduction {
                member: id,
                templates: member.templates.clone(),
                hides,
            },
        ));
    }
}

/// Wrap a contract so that it runs before (input) or after (output) the previous implementation.
fn contract_template(template: &Template, direction: ContractDirection) -> Template {
    let contract = template
        .lines
        .iter()
        .filter(|line| !matches!(line, TemplateLine::Proceed))
        .cloned();
    let lines = match direction {
        ContractDirection::Input => contract.chain(std::iter::once(TemplateLine::Proceed)).collect(),
        ContractDirection::Output => std::iter::once(TemplateLine::Proceed).chain(contract).collect(),
    };
    Template {
        name: format!("contract:{}", template.name),
        lines,
    }
}

impl AdviceEvaluator for TemplateAdviceEvaluator {
    fn evaluate(
        &self,
        advice: &[Advice],
        tree: &DeclarationTree,
        _order: &AspectLayerOrder,
    ) -> AdviceEvaluationResult {
        let mut evaluation = Evaluation {
            tree,
            revised: None,
            result: AdviceEvaluationResult::default(),
        };
        for advice in advice {
            evaluation.evaluate(advice);
        }
        evaluation.result.tree = evaluation.revised;
        evaluation.result
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use weaver_model::{
        AspectLayerId, Body, DeclarationOrigin, Signature, TransformationSemantic,
    };

    use super::*;

    struct Fixture {
        tree: DeclarationTree,
        ty: DeclarationId,
        bar: DeclarationId,
        count: DeclarationId,
    }

    fn fixture() -> Fixture {
        let mut tree = DeclarationTree::new();
        let ty = tree.insert(None, Declaration::new("Service", DeclarationKind::Type));
        let bar = tree.insert(
            Some(ty),
            Declaration::new("Bar", DeclarationKind::Method)
                .with_body(Accessor::Invoke, Body::text(["emit bar"])),
        );
        let count = tree.insert(
            Some(ty),
            Declaration::new("Count", DeclarationKind::Property)
                .with_auto_accessor(Accessor::Get),
        );
        Fixture {
            tree,
            ty,
            bar,
            count,
        }
    }

    fn layer() -> AspectLayerId {
        AspectLayerId::default_layer("Intro")
    }

    fn introduce(ty: DeclarationId, when_exists: OverrideStrategy) -> Advice {
        Advice::new(
            Uuid::new_v4(),
            ty,
            layer(),
            AdviceKind::Introduce {
                member: IntroducedMember::new("Bar", DeclarationKind::Method).with_template(
                    Accessor::Invoke,
                    Template::parse("bar", ["emit introduced", "proceed"]),
                ),
                when_exists,
            },
        )
    }

    fn evaluate(tree: &DeclarationTree, advice: &[Advice]) -> AdviceEvaluationResult {
        TemplateAdviceEvaluator::new().evaluate(advice, tree, &AspectLayerOrder::from_ids([layer()]))
    }

    #[test]
    fn test_introduce_ignore() {
        let f = fixture();
        let result = evaluate(&f.tree, &[introduce(f.ty, OverrideStrategy::Ignore)]);
        assert!(result.tree.is_none());
        assert!(result.observable.is_empty());
        assert!(result.non_observable.is_empty());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_introduce_fail() {
        let f = fixture();
        let result = evaluate(&f.tree, &[introduce(f.ty, OverrideStrategy::Fail)]);
        assert!(result.observable.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].is_error());
    }

    #[test]
    fn test_introduce_override() {
        let f = fixture();
        let result = evaluate(&f.tree, &[introduce(f.ty, OverrideStrategy::Override)]);
        assert!(result.tree.is_none());
        assert_eq!(result.non_observable.len(), 1);
        let transformation = &result.non_observable[0];
        assert_eq!(transformation.target, f.bar);
        assert_eq!(transformation.semantic(), TransformationSemantic::Override);
    }

    #[test]
    fn test_introduce_new() {
        let f = fixture();
        let result = evaluate(&f.tree, &[introduce(f.ty, OverrideStrategy::New)]);
        let tree = result.tree.unwrap();
        assert_eq!(tree.len(), f.tree.len() + 1);
        assert_eq!(result.observable.len(), 1);
        let member = result.observable[0].subject();
        let declaration = tree.get(member).unwrap();
        assert_eq!(declaration.hides, Some(f.bar));
        assert_eq!(
            declaration.origin,
            DeclarationOrigin::Introduced { layer: layer() }
        );
        assert_eq!(result.observable[0].target, f.ty);
    }

    #[test]
    fn test_introduce_then_override_in_same_batch() {
        let f = fixture();
        let baz = |when_exists| {
            Advice::new(
                Uuid::new_v4(),
                f.ty,
                layer(),
                AdviceKind::Introduce {
                    member: IntroducedMember::new("Baz", DeclarationKind::Method).with_template(
                        Accessor::Invoke,
                        Template::parse("baz", ["emit baz", "proceed"]),
                    ),
                    when_exists,
                },
            )
        };
        let result = evaluate(
            &f.tree,
            &[baz(OverrideStrategy::Fail), baz(OverrideStrategy::Override)],
        );
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.observable.len(), 1);
        assert_eq!(result.non_observable.len(), 1);
        let introduced = result.observable[0].subject();
        assert!(result.tree.unwrap().contains(introduced));
        assert!(!f.tree.contains(introduced));
        assert_eq!(result.non_observable[0].target, introduced);
    }

    #[test]
    fn test_introduce_override_missing_accessor() {
        let f = fixture();
        let advice = Advice::new(
            Uuid::new_v4(),
            f.ty,
            layer(),
            AdviceKind::Introduce {
                member: IntroducedMember::new("Count", DeclarationKind::Property)
                    .with_template(Accessor::Get, Template::parse("get", ["emit get", "proceed"]))
                    .with_template(Accessor::Set, Template::parse("set", ["emit set", "proceed"])),
                when_exists: OverrideStrategy::Override,
            },
        );
        let result = evaluate(&f.tree, &[advice]);
        assert!(result.non_observable.is_empty());
        assert!(result.tree.is_none());
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].is_error());
        assert!(result.diagnostics[0]
            .message()
            .contains("has no set accessor to override"));
    }

    #[test]
    fn test_introductions_see_each_other() {
        let f = fixture();
        let overload = |name: &str| {
            Advice::new(
                Uuid::new_v4(),
                f.ty,
                layer(),
                AdviceKind::Introduce {
                    member: IntroducedMember::new(name, DeclarationKind::Method)
                        .with_signature(Signature::new().parameter("x", "int")),
                    when_exists: OverrideStrategy::Fail,
                },
            )
        };
        let result = evaluate(&f.tree, &[overload("Baz"), overload("Baz")]);
        assert_eq!(result.observable.len(), 1);
        assert_eq!(result.diagnostics.len(), 1);
        let tree = result.tree.unwrap();
        let baz = tree.get(result.observable[0].subject()).unwrap();
        assert_eq!(baz.accessors.get(&Accessor::Invoke), Some(&Implementation::Introduced));
    }

    #[test]
    fn test_override_missing_accessor() {
        let f = fixture();
        let advice = Advice::override_accessor(
            Uuid::new_v4(),
            f.count,
            layer(),
            Accessor::Set,
            Template::parse("set", ["proceed"]),
        );
        let result = evaluate(&f.tree, &[advice]);
        assert!(result.non_observable.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn test_contracts() {
        let f = fixture();
        let contract = |direction| {
            Advice::new(
                Uuid::new_v4(),
                f.bar,
                layer(),
                AdviceKind::AddContract {
                    accessor: Accessor::Invoke,
                    direction,
                    template: Template::parse("check", ["emit check"]),
                },
            )
        };
        let result = evaluate(
            &f.tree,
            &[contract(ContractDirection::Input), contract(ContractDirection::Output)],
        );
        let lines: Vec<_> = result
            .non_observable
            .iter()
            .map(|t| match &t.kind {
                TransformationKind::Override { templates } => templates[&Accessor::Invoke].lines.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(
            lines,
            vec![
                vec![TemplateLine::Emit("check".into()), TemplateLine::Proceed],
                vec![TemplateLine::Proceed, TemplateLine::Emit("check".into())],
            ]
        );
    }

    #[test]
    fn test_redirect_and_resources() {
        let mut f = fixture();
        let other = f.tree.insert(
            Some(f.ty),
            Declaration::new("Other", DeclarationKind::Method)
                .with_body(Accessor::Invoke, Body::new()),
        );
        let redirect = Advice::new(
            Uuid::new_v4(),
            f.bar,
            layer(),
            AdviceKind::Redirect { to: other },
        );
        let wrong = Advice::new(
            Uuid::new_v4(),
            f.bar,
            layer(),
            AdviceKind::Redirect { to: f.count },
        );
        let resource = Advice::new(
            Uuid::new_v4(),
            f.ty,
            layer(),
            AdviceKind::AddResource {
                name: "notes.txt".into(),
                content: "hello".into(),
            },
        );
        let result = evaluate(&f.tree, &[redirect, wrong, resource]);
        assert_eq!(result.non_observable.len(), 1);
        assert_eq!(
            result.non_observable[0].kind,
            TransformationKind::Redirect { to: other }
        );
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.artifacts.len(), 1);
        assert_eq!(result.artifacts[0].name, "notes.txt");
    }
}
