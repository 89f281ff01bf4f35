use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{anyhow, bail, Error};

use weaver_diagnostics::Diagnostic;
use weaver_model::{
    Advice, AdviceKind, AspectInstance, AspectLayerId, AspectLayerOrder, AspectSource,
    Declaration, DeclarationKind, DeclarationTree, IntroducedMember, StaticAspectSource, Template,
};
use weaver_pipeline::{AspectEvaluationResult, AspectEvaluator};

use crate::config::{
    AdviceKindSpec, AdviceSpec, AdviceTargetSpec, ApplySpec, AspectSpec, MemberSpec, Project,
};

/// Evaluates the aspect classes described in a [`Project`].
///
/// Every instance produces the advice of its class, for its target or for the matching children
/// of the target, and an aspect source for each child aspect. An instance whose class is unknown,
/// or whose advice cannot be built, fails: nothing it produced is scheduled.
#[derive(Debug, Clone, Default)]
pub struct DeclarativeAspectEvaluator {
    aspects: HashMap<String, AspectSpec>,
    /// The exclusions of the project, applied also to the child aspects.
    exclusions: Vec<ApplySpec>,
}

impl DeclarativeAspectEvaluator {
    pub fn new(project: &Project) -> DeclarativeAspectEvaluator {
        DeclarativeAspectEvaluator {
            aspects: project
                .aspects
                .iter()
                .map(|a| (a.name.clone(), a.clone()))
                .collect(),
            exclusions: project.exclude.clone(),
        }
    }

    fn evaluate_spec(
        &self,
        spec: &AspectSpec,
        instance: &AspectInstance,
        tree: &DeclarationTree,
    ) -> Result<AspectEvaluationResult, Error> {
        let target = tree
            .get(instance.target)
            .ok_or_else(|| anyhow!("The target {} is not in the tree", instance.target))?;
        if !spec.eligible.is_empty() && !spec.eligible.contains(&target.kind) {
            bail!("{} cannot be applied to a {}", spec.name, target.kind);
        }
        let mut result = AspectEvaluationResult::success();
        for advice in &spec.advice {
            let layer = AspectLayerId::new(&spec.name, advice.layer.as_deref());
            for declaration in advice_targets(advice, target, tree) {
                result
                    .advice
                    .push(build_advice(spec, advice, layer.clone(), instance, declaration, tree)?);
            }
        }
        let path = tree.path(target.id);
        for child in &spec.children {
            let mut source = StaticAspectSource::new(format!("{} on {}", spec.name, path));
            let mut any = false;
            for member in tree.children(target.id) {
                let Some(member) = tree.get(*member) else {
                    continue;
                };
                if child.filter.matches(member) {
                    source = source.with_application(&child.aspect, member.id);
                    any = true;
                }
            }
            for exclusion in self.exclusions.iter().filter(|e| e.aspect == child.aspect) {
                if let Some(excluded) = tree.find_by_path(&exclusion.target) {
                    source = source.with_exclusion(&child.aspect, excluded);
                }
            }
            if any {
                let source: Arc<dyn AspectSource> = Arc::new(source);
                result.aspect_sources.push(source);
            }
        }
        debug!(
            "{} on {} produced {} advice and {} sources",
            spec.name,
            path,
            result.advice.len(),
            result.aspect_sources.len()
        );
        Ok(result)
    }
}

impl AspectEvaluator for DeclarativeAspectEvaluator {
    fn evaluate(
        &self,
        instance: &AspectInstance,
        tree: &DeclarationTree,
        _order: &AspectLayerOrder,
    ) -> AspectEvaluationResult {
        let path = tree.path(instance.target);
        let Some(spec) = self.aspects.get(&instance.aspect) else {
            return AspectEvaluationResult::failure(
                Diagnostic::error(format!("Unknown aspect class {}", instance.aspect))
                    .with_location(path),
            );
        };
        match self.evaluate_spec(spec, instance, tree) {
            Ok(result) => result,
            Err(e) => AspectEvaluationResult::failure(
                Diagnostic::error(format!("Cannot apply {} to {}: {:#}", spec.name, path, e))
                    .with_origin(spec.name.clone())
                    .with_location(path),
            ),
        }
    }
}

/// The declarations an advice is about.
fn advice_targets<'t>(
    advice: &AdviceSpec,
    target: &'t Declaration,
    tree: &'t DeclarationTree,
) -> Vec<&'t Declaration> {
    match advice.on {
        AdviceTargetSpec::Declaration => vec![target],
        AdviceTargetSpec::Members => tree
            .children(target.id)
            .iter()
            .filter_map(|id| tree.get(*id))
            .filter(|d| advice.filter.matches(d))
            .collect(),
    }
}

fn template(name: String, lines: &[String]) -> Template {
    Template::parse(name, lines)
}

fn introduced_member(
    member: &MemberSpec,
    layer: &AspectLayerId,
) -> Result<IntroducedMember, Error> {
    let name = member.name()?;
    let mut introduced = IntroducedMember::new(&name, member.kind)
        .with_signature(member.signature())
        .with_accessibility(member.accessibility);
    if !member.auto_accessors()?.is_empty() {
        introduced = introduced.auto();
    }
    for (accessor, lines) in member.bodies()? {
        introduced = introduced.with_template(
            accessor,
            template(format!("{}/{}.{}", layer, name, accessor), &lines),
        );
    }
    Ok(introduced)
}

fn build_advice(
    spec: &AspectSpec,
    advice: &AdviceSpec,
    layer: AspectLayerId,
    instance: &AspectInstance,
    declaration: &Declaration,
    tree: &DeclarationTree,
) -> Result<Advice, Error> {
    let mut arguments = BTreeMap::new();
    arguments.insert("aspect".to_string(), spec.name.clone());
    arguments.insert("target".to_string(), tree.path(declaration.id));
    arguments.extend(advice.arguments.clone());
    let kind = match &advice.kind {
        AdviceKindSpec::Override { templates } => {
            let mut bodies = BTreeMap::new();
            for (accessor, lines) in templates {
                if !declaration.kind.accessors().contains(accessor) {
                    bail!(
                        "{} {} has no {} accessor to override",
                        declaration.kind,
                        declaration.name,
                        accessor
                    );
                }
                bodies.insert(
                    *accessor,
                    template(format!("{}/{}", layer, accessor), lines),
                );
            }
            AdviceKind::Override { templates: bodies }
        }
        AdviceKindSpec::Introduce {
            member,
            when_exists,
        } => {
            if declaration.kind != DeclarationKind::Type {
                bail!("members can only be introduced in types, not in {}", declaration.name);
            }
            AdviceKind::Introduce {
                member: introduced_member(member, &layer)?,
                when_exists: *when_exists,
            }
        }
        AdviceKindSpec::Contract {
            accessor,
            direction,
            lines,
        } => {
            let accessor = match accessor {
                Some(accessor) => *accessor,
                None => *declaration.kind.accessors().first().ok_or_else(|| {
                    anyhow!("a {} has no accessor to check", declaration.kind)
                })?,
            };
            AdviceKind::AddContract {
                accessor,
                direction: *direction,
                template: template(format!("{}/contract.{}", layer, accessor), lines),
            }
        }
        AdviceKindSpec::Redirect { to } => {
            let ty = tree
                .declaring_type(declaration.id)
                .ok_or_else(|| anyhow!("{} is not a member of a type", declaration.name))?;
            let to = tree
                .members_of(ty.id)
                .find(|m| &m.name == to && m.id != declaration.id)
                .ok_or_else(|| anyhow!("{} has no member {} to redirect to", ty.name, to))?;
            AdviceKind::Redirect { to: to.id }
        }
        AdviceKindSpec::Resource { name, content } => {
            // resources are not expanded by the linker
            let content = arguments.iter().fold(content.clone(), |content, (k, v)| {
                content.replace(&format!("{{{}}}", k), v)
            });
            AdviceKind::AddResource {
                name: name.clone(),
                content,
            }
        }
    };
    let mut result = Advice::new(instance.uuid, declaration.id, layer, kind);
    result.arguments = arguments;
    Ok(result)
}
