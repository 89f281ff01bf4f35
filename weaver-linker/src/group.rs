use std::collections::BTreeMap;

use weaver_diagnostics::Diagnostic;
use weaver_model::{
    Accessor, AspectLayerId, AspectLayerOrder, DeclarationId, DeclarationTree, Template,
    Transformation, TransformationKind,
};
use weaver_pipeline::TransformationStore;

/// An override of a declaration, positioned in its chain by the global order of its layer.
#[derive(Debug, Clone, Copy)]
pub struct OverrideChainEntry<'s> {
    pub layer: &'s AspectLayerId,
    /// The global order index of the layer, `usize::MAX` for layers unknown to the order.
    pub order_index: usize,
    pub transformation: &'s Transformation,
    pub templates: &'s BTreeMap<Accessor, Template>,
}

impl<'s> OverrideChainEntry<'s> {
    fn key(&self) -> (usize, usize) {
        (self.order_index, self.transformation.ordinal)
    }

    /// Whether this entry overrides `accessor`.
    pub fn provides(&self, accessor: Accessor) -> bool {
        self.templates.contains_key(&accessor)
    }
}

/// All the transformations about one member.
#[derive(Debug, Clone, Default)]
pub struct DeclarationGroup<'s> {
    /// The introduction that created the member, if it's not from the source.
    pub introduction: Option<&'s Transformation>,
    /// The overrides, sorted by layer order. Index 0 is applied first.
    pub overrides: Vec<OverrideChainEntry<'s>>,
    /// The redirect replacing the original implementation.
    pub redirect: Option<&'s Transformation>,
}

impl<'s> DeclarationGroup<'s> {
    /// Whether the member has to be linked as a chain.
    pub fn is_chained(&self) -> bool {
        !self.overrides.is_empty()
    }

    /// The templates of the introduction.
    pub fn introduced_templates(&self) -> Option<&'s BTreeMap<Accessor, Template>> {
        match self.introduction.map(|t| &t.kind) {
            Some(TransformationKind::Introduction { templates, .. }) => Some(templates),
            _ => None,
        }
    }

    /// The member the redirect forwards to.
    pub fn redirect_target(&self) -> Option<DeclarationId> {
        match self.redirect.map(|t| &t.kind) {
            Some(TransformationKind::Redirect { to }) => Some(*to),
            _ => None,
        }
    }
}

/// The unit of work of the linker: a type with the transformations of its members.
#[derive(Debug, Clone)]
pub struct TypeGroup<'s> {
    pub ty: DeclarationId,
    pub members: BTreeMap<DeclarationId, DeclarationGroup<'s>>,
}

/// Group the transformations by subject, then by the type declaring the subject. Every type of
/// the tree gets a group, even if nothing targets it.
pub fn group_by_type<'s>(
    tree: &DeclarationTree,
    store: &'s TransformationStore,
    order: &AspectLayerOrder,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<TypeGroup<'s>> {
    let mut types: BTreeMap<DeclarationId, TypeGroup<'s>> = tree
        .types()
        .map(|t| {
            (
                t.id,
                TypeGroup {
                    ty: t.id,
                    members: BTreeMap::new(),
                },
            )
        })
        .collect();

    for (subject, transformations) in store.by_subject() {
        let member = match tree.get(subject) {
            Some(member) if member.kind.is_member() => member,
            _ => {
                diagnostics.push(
                    Diagnostic::warning(format!(
                        "Ignoring {} transformation(s) about {}: it's not a member of a type",
                        transformations.len(),
                        subject
                    ))
                    .with_location(tree.path(subject)),
                );
                continue;
            }
        };
        let ty = match tree.declaring_type(subject) {
            Some(ty) => ty.id,
            None => {
                diagnostics.push(
                    Diagnostic::warning("Ignoring a member without a declaring type")
                        .with_location(tree.path(subject)),
                );
                continue;
            }
        };
        let mut group = DeclarationGroup::default();
        for transformation in transformations {
            match &transformation.kind {
                TransformationKind::Introduction { .. } => {
                    if group.introduction.is_some() {
                        diagnostics.push(
                            Diagnostic::warning("The member has been introduced more than once")
                                .with_origin(transformation.layer.to_string())
                                .with_location(tree.path(subject)),
                        );
                    } else {
                        group.introduction = Some(transformation);
                    }
                }
                TransformationKind::Override { templates } => {
                    group.overrides.push(OverrideChainEntry {
                        layer: &transformation.layer,
                        order_index: order
                            .order_index(&transformation.layer)
                            .unwrap_or(usize::MAX),
                        transformation,
                        templates,
                    });
                }
                TransformationKind::Redirect { .. } => {
                    if let Some(previous) = group.redirect {
                        diagnostics.push(
                            Diagnostic::warning(format!(
                                "The redirect of {} is replaced by the one of {}",
                                previous.layer, transformation.layer
                            ))
                            .with_origin(transformation.layer.to_string())
                            .with_location(tree.path(subject)),
                        );
                    }
                    group.redirect = Some(transformation);
                }
            }
        }
        group.overrides.sort_by_key(|e| e.key());
        trace!(
            "{} has {} override(s)",
            member.name,
            group.overrides.len()
        );
        if let Some(type_group) = types.get_mut(&ty) {
            type_group.members.insert(subject, group);
        }
    }
    types.into_values().collect()
}
