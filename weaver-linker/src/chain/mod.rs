//! Reconstruction of the members targeted by overrides.
//!
//! The original implementation of a chained member moves into a private base member, every
//! override but the last becomes a private entry and the public member keeps the body of the
//! last override. Each body proceeds to the previous implementation of the same accessor, so
//! calling the public member runs the overrides in reverse layer order, down to the base.
//!
//! What changes between the kinds of members (the accessors, the names of the entries, the kind
//! of the public member) is described by a [`ChainBuilder`].

use std::collections::BTreeMap;

use weaver_model::{
    Accessibility, Accessor, Body, ChainSlot, Declaration, DeclarationKind, DeclarationOrigin,
    DeclarationTree, Implementation, Signature, Statement,
};

use crate::expand::{ExpansionContext, SlotProceed, TemplateExpander};
use crate::group::DeclarationGroup;
use crate::naming::{backing_field_name, NameScope};
use crate::resolve::{resolve_body, SlotNames};
use crate::{LinkError, LinkedBody, LinkedMember, MemberOrigin};

mod accessors;
mod constructor;
mod method;

pub use accessors::{AccessorChain, FieldChain};
pub use constructor::ConstructorChain;
pub use method::MethodChain;

/// The kind-specific rules for rebuilding a member as a chain.
pub trait ChainBuilder: Sync {
    /// The accessors that can be chained.
    fn accessors(&self, declaration: &Declaration) -> Vec<Accessor>;

    /// The name the private members of the chain are derived from.
    fn stem(&self, declaration: &Declaration) -> String {
        declaration.name.clone()
    }

    /// The kind of the private members of the chain.
    fn entry_kind(&self, declaration: &Declaration) -> DeclarationKind {
        declaration.kind
    }

    /// The kind of the public member.
    fn public_kind(&self, declaration: &Declaration) -> DeclarationKind {
        declaration.kind
    }

    /// Whether the last entry is private too, with the public member forwarding to it.
    fn forwards_public(&self) -> bool {
        false
    }

    /// Whether the compiler-generated accessors have to be stored in a backing field once
    /// chained.
    fn is_auto(&self, declaration: &Declaration) -> bool {
        declaration.is_auto()
    }
}

/// The chain builder of a kind of declaration, `None` for non-members.
pub fn builder_for(kind: DeclarationKind) -> Option<&'static dyn ChainBuilder> {
    match kind {
        DeclarationKind::Method | DeclarationKind::Operator | DeclarationKind::Finalizer => {
            Some(&MethodChain)
        }
        DeclarationKind::Property | DeclarationKind::Indexer | DeclarationKind::Event => {
            Some(&AccessorChain)
        }
        DeclarationKind::Field => Some(&FieldChain),
        DeclarationKind::Constructor => Some(&ConstructorChain),
        DeclarationKind::Namespace | DeclarationKind::Type => None,
    }
}

/// Everything needed to link a single member.
pub struct ChainContext<'a> {
    pub tree: &'a DeclarationTree,
    pub declaration: &'a Declaration,
    pub group: &'a DeclarationGroup<'a>,
    pub expander: &'a dyn TemplateExpander,
}

/// The members produced for a single declaration.
#[derive(Debug, Clone, Default)]
pub struct LinkedChain {
    pub members: Vec<LinkedMember>,
    /// The backing fields that have been materialized.
    pub backing_fields: Vec<String>,
}

/// Link a member: emit it unchanged if nothing overrides it, otherwise rebuild it as a chain.
/// The names are allocated in `scope`; on error the scope may contain names that are not used.
pub fn link_member(ctx: &ChainContext, scope: &mut NameScope) -> Result<LinkedChain, LinkError> {
    let declaration = ctx.declaration;
    let builder = match builder_for(declaration.kind) {
        Some(builder) => builder,
        None => return Ok(LinkedChain::default()),
    };
    check_conflicts(ctx)?;

    let accessors = builder.accessors(declaration);
    let chained: Vec<Accessor> = accessors
        .iter()
        .copied()
        .filter(|a| ctx.group.overrides.iter().any(|e| e.provides(*a)))
        .collect();
    if chained.is_empty() && ctx.group.redirect.is_none() {
        return Ok(LinkedChain {
            members: vec![plain_member(ctx)?],
            backing_fields: vec![],
        });
    }

    let mut chain = LinkedChain::default();
    let stem = builder.stem(declaration);
    let backing = if !chained.is_empty()
        && ctx.group.redirect.is_none()
        && builder.is_auto(declaration)
    {
        let name = scope.allocate(&backing_field_name(&stem))?;
        chain.members.push(LinkedMember {
            name: name.clone(),
            kind: DeclarationKind::Field,
            accessibility: Accessibility::Private,
            signature: Signature {
                parameters: vec![],
                return_type: declaration.signature.return_type.clone(),
            },
            type_parameters: vec![],
            is_new: false,
            is_implicit: false,
            accessors: BTreeMap::new(),
            origin: MemberOrigin::BackingField {
                of: declaration.name.clone(),
            },
        });
        chain.backing_fields.push(name.clone());
        Some(name)
    } else {
        None
    };

    let mut base = BTreeMap::new();
    for accessor in &accessors {
        base.insert(*accessor, base_body(ctx, *accessor, backing.as_deref())?);
    }

    let mut names = SlotNames::unchained(declaration.id);
    if chained.is_empty() {
        // redirected, but not overridden
        let public = public_member(ctx, builder, resolve_all(base, &names)?);
        chain.members.push(public);
        return Ok(chain);
    }

    let base_suffix = match &declaration.origin {
        DeclarationOrigin::Source => "Source".to_string(),
        DeclarationOrigin::Introduced { layer } => layer.suffix(),
    };
    names.base = Some(scope.allocate(&format!("{}_{}", stem, base_suffix))?);

    let overrides = &ctx.group.overrides;
    let last: BTreeMap<Accessor, usize> = chained
        .iter()
        .filter_map(|a| overrides.iter().rposition(|e| e.provides(*a)).map(|i| (*a, i)))
        .collect();
    let forwards = builder.forwards_public();
    let private_accessors: Vec<Vec<Accessor>> = overrides
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            chained
                .iter()
                .copied()
                .filter(|a| entry.provides(*a) && (forwards || last.get(a) != Some(&index)))
                .collect()
        })
        .collect();
    for (index, entry) in overrides.iter().enumerate() {
        if !private_accessors[index].is_empty() {
            let name = scope.allocate(&format!("{}_{}", stem, entry.layer.suffix()))?;
            names.entries.insert(index, name);
        }
    }

    // expand every override, each proceeding to the previous implementation of its accessor
    let mut expanded: Vec<BTreeMap<Accessor, Body>> = Vec::with_capacity(overrides.len());
    for (index, entry) in overrides.iter().enumerate() {
        let mut bodies = BTreeMap::new();
        for accessor in &chained {
            let template = match entry.templates.get(accessor) {
                Some(template) => template,
                None => continue,
            };
            let previous = overrides[..index]
                .iter()
                .rposition(|e| e.provides(*accessor))
                .map(ChainSlot::Entry)
                .unwrap_or(ChainSlot::Base);
            let context = ExpansionContext {
                declaration,
                accessor: *accessor,
                arguments: &entry.transformation.arguments,
                layer: entry.layer,
            };
            let proceed = SlotProceed {
                declaration: declaration.id,
                slot: previous,
            };
            let body = ctx.expander.expand(template, &context, &proceed)?;
            bodies.insert(*accessor, resolve_body(body, &names)?);
        }
        expanded.push(bodies);
    }

    let entry_kind = builder.entry_kind(declaration);
    let mut base_accessors = BTreeMap::new();
    for accessor in &chained {
        if let Some(body) = base.remove(accessor) {
            base_accessors.insert(*accessor, body);
        }
    }
    chain.members.push(private_member(
        ctx,
        names.base.clone().unwrap_or_default(),
        entry_kind,
        resolve_all(base_accessors, &names)?,
        MemberOrigin::ChainBase {
            of: declaration.name.clone(),
        },
    ));
    for (index, entry) in overrides.iter().enumerate() {
        let name = match names.entries.get(&index) {
            Some(name) => name.clone(),
            None => continue,
        };
        let accessors = private_accessors[index]
            .iter()
            .filter_map(|a| expanded[index].get(a).map(|b| (*a, LinkedBody::Block(b.clone()))))
            .collect();
        chain.members.push(private_member(
            ctx,
            name,
            entry_kind,
            accessors,
            MemberOrigin::ChainEntry {
                of: declaration.name.clone(),
                layer: entry.layer.clone(),
            },
        ));
    }

    let mut public = BTreeMap::new();
    for accessor in &accessors {
        let body = match last.get(accessor) {
            Some(&index) if forwards => match names.entries.get(&index) {
                Some(name) => LinkedBody::Block(Body::forward(name.clone(), *accessor)),
                None => {
                    return Err(LinkError::UnresolvedProceed {
                        declaration: declaration.id,
                        slot: ChainSlot::Entry(index),
                    })
                }
            },
            Some(&index) => match expanded[index].remove(accessor) {
                Some(body) => LinkedBody::Block(body),
                None => LinkedBody::Block(Body::new()),
            },
            None => match base.remove(accessor) {
                Some(body) => resolve_linked(body, &names)?,
                None => continue,
            },
        };
        public.insert(*accessor, body);
    }
    chain.members.push(public_member(ctx, builder, public));
    Ok(chain)
}

/// The member exactly as it is in the tree, with the introduced bodies expanded.
fn plain_member(ctx: &ChainContext) -> Result<LinkedMember, LinkError> {
    let declaration = ctx.declaration;
    let names = SlotNames::unchained(declaration.id);
    let mut accessors = BTreeMap::new();
    for (accessor, implementation) in &declaration.accessors {
        let body = match implementation {
            Implementation::Auto => LinkedBody::Auto,
            Implementation::Block(body) => LinkedBody::Block(body.clone()),
            Implementation::Introduced => {
                LinkedBody::Block(resolve_body(expand_introduced(ctx, *accessor)?, &names)?)
            }
        };
        accessors.insert(*accessor, body);
    }
    Ok(LinkedMember {
        accessors,
        ..original_member(declaration)
    })
}

/// The member as written in the tree, without expanding anything.
pub fn original_member(declaration: &Declaration) -> LinkedMember {
    let accessors = declaration
        .accessors
        .iter()
        .map(|(accessor, implementation)| {
            let body = match implementation {
                Implementation::Auto => LinkedBody::Auto,
                Implementation::Block(body) => LinkedBody::Block(body.clone()),
                Implementation::Introduced => LinkedBody::Block(Body::new()),
            };
            (*accessor, body)
        })
        .collect();
    LinkedMember {
        name: declaration.name.clone(),
        kind: declaration.kind,
        accessibility: declaration.accessibility,
        signature: declaration.signature.clone(),
        type_parameters: declaration.type_parameters.clone(),
        is_new: declaration.hides.is_some(),
        is_implicit: declaration.is_implicit,
        accessors,
        origin: source_origin(declaration),
    }
}

fn source_origin(declaration: &Declaration) -> MemberOrigin {
    match &declaration.origin {
        DeclarationOrigin::Source => MemberOrigin::Source,
        DeclarationOrigin::Introduced { layer } => MemberOrigin::Introduced {
            layer: layer.clone(),
        },
    }
}

fn public_member(
    ctx: &ChainContext,
    builder: &dyn ChainBuilder,
    accessors: BTreeMap<Accessor, LinkedBody>,
) -> LinkedMember {
    LinkedMember {
        kind: builder.public_kind(ctx.declaration),
        accessors,
        ..original_member(ctx.declaration)
    }
}

fn private_member(
    ctx: &ChainContext,
    name: String,
    kind: DeclarationKind,
    accessors: BTreeMap<Accessor, LinkedBody>,
    origin: MemberOrigin,
) -> LinkedMember {
    LinkedMember {
        name,
        kind,
        accessibility: Accessibility::Private,
        signature: ctx.declaration.signature.clone(),
        type_parameters: ctx.declaration.type_parameters.clone(),
        is_new: false,
        is_implicit: false,
        accessors,
        origin,
    }
}

/// An introduced member can't coexist with a member with the same signature unless it hides it.
fn check_conflicts(ctx: &ChainContext) -> Result<(), LinkError> {
    let declaration = ctx.declaration;
    if !declaration.is_introduced() || declaration.hides.is_some() {
        return Ok(());
    }
    let ty = match ctx.tree.declaring_type(declaration.id) {
        Some(ty) => ty.id,
        None => return Ok(()),
    };
    let conflict = ctx.tree.members_of(ty).any(|member| {
        member.id != declaration.id
            && member.hides != Some(declaration.id)
            && member.conflicts_with(&declaration.name, declaration.kind, &declaration.signature)
    });
    if conflict {
        return Err(LinkError::Conflict {
            name: declaration.name.clone(),
        });
    }
    Ok(())
}

/// The original implementation of an accessor: a forward to the redirect target, the source
/// body, the introduced body or an access to the backing field.
fn base_body(
    ctx: &ChainContext,
    accessor: Accessor,
    backing: Option<&str>,
) -> Result<LinkedBody, LinkError> {
    let declaration = ctx.declaration;
    if let Some(to) = ctx.group.redirect_target() {
        let target = ctx
            .tree
            .get(to)
            .ok_or(LinkError::UnknownRedirect { to })?;
        return Ok(LinkedBody::Block(Body::forward(target.name.clone(), accessor)));
    }
    let implementation = match declaration.accessors.get(&accessor) {
        Some(implementation) => Some(implementation),
        None if declaration.kind == DeclarationKind::Field => Some(&Implementation::Auto),
        None => None,
    };
    let body = match implementation {
        Some(Implementation::Auto) => match backing {
            Some(field) => LinkedBody::Block(auto_body(field, accessor)),
            None => LinkedBody::Auto,
        },
        Some(Implementation::Block(body)) => LinkedBody::Block(body.clone()),
        Some(Implementation::Introduced) => LinkedBody::Block(expand_introduced(ctx, accessor)?),
        None => LinkedBody::Block(Body::new()),
    };
    Ok(body)
}

/// The body of a compiler-generated accessor stored in `field`.
fn auto_body(field: &str, accessor: Accessor) -> Body {
    let line = match accessor {
        Accessor::Invoke => return Body::new(),
        Accessor::Get => format!("return {};", field),
        Accessor::Set => format!("{} = value;", field),
        Accessor::Add => format!("{} += value;", field),
        Accessor::Remove => format!("{} -= value;", field),
    };
    Body {
        statements: vec![Statement::Text(line)],
    }
}

/// Expand the introduced template of an accessor. There is nothing to proceed to.
fn expand_introduced(ctx: &ChainContext, accessor: Accessor) -> Result<Body, LinkError> {
    let introduction = match ctx.group.introduction {
        Some(introduction) => introduction,
        None => return Ok(Body::new()),
    };
    let template = match ctx
        .group
        .introduced_templates()
        .and_then(|templates| templates.get(&accessor))
    {
        Some(template) => template,
        None => return Ok(Body::new()),
    };
    let context = ExpansionContext {
        declaration: ctx.declaration,
        accessor,
        arguments: &introduction.arguments,
        layer: &introduction.layer,
    };
    let proceed = SlotProceed {
        declaration: ctx.declaration.id,
        slot: ChainSlot::Nothing,
    };
    Ok(ctx.expander.expand(template, &context, &proceed)?)
}

fn resolve_linked(body: LinkedBody, names: &SlotNames) -> Result<LinkedBody, LinkError> {
    match body {
        LinkedBody::Auto => Ok(LinkedBody::Auto),
        LinkedBody::Block(body) => Ok(LinkedBody::Block(resolve_body(body, names)?)),
    }
}

fn resolve_all(
    bodies: BTreeMap<Accessor, LinkedBody>,
    names: &SlotNames,
) -> Result<BTreeMap<Accessor, LinkedBody>, LinkError> {
    bodies
        .into_iter()
        .map(|(accessor, body)| Ok((accessor, resolve_linked(body, names)?)))
        .collect()
}
