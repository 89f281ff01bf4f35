//! The linker turns the final declaration tree and the store of transformations into the linked
//! output.
//!
//! Every member with no override is emitted unchanged. A member with overrides is rebuilt as a
//! chain: the overrides are sorted by the global order of their layers, the earlier ones become
//! private members with collision-free names, and the public member is bound to the last one.
//! Each body calls the previous one through its proceed references, which are resolved only
//! once all the names of the chain are known.
//!
//! The types are independent from each other, so they are linked in parallel. All the names
//! generated for a type are allocated by the single worker that links it.
//!
//! ```
//! use weaver_linker::Linker;
//! use weaver_model::*;
//! use weaver_pipeline::TransformationStore;
//!
//! let mut tree = DeclarationTree::new();
//! let ty = tree.insert(None, Declaration::new("Service", DeclarationKind::Type));
//! tree.insert(
//!     Some(ty),
//!     Declaration::new("Foo", DeclarationKind::Method).with_body(Accessor::Invoke, Body::text(["emit foo"])),
//! );
//! let store = TransformationStore::new();
//! let order = AspectLayerOrder::default();
//! let result = Linker::new(&tree, &store, &order).link();
//! assert!(result.diagnostics.is_empty());
//! assert_eq!(result.output.types[0].member_names(), vec!["Foo"]);
//! ```

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

use std::collections::BTreeMap;
use std::thread;

use crossbeam_channel::{unbounded, Receiver};

use weaver_diagnostics::{Diagnostic, DiagnosticContext};
use weaver_model::{
    Accessibility, Accessor, AspectLayerOrder, Body, DeclarationKind, DeclarationTree, Signature,
    CONSTRUCTOR_NAME,
};
use weaver_pipeline::TransformationStore;

mod chain;
mod error;
mod expand;
mod group;
mod naming;
mod output;
mod render;
mod resolve;
mod trace;

pub use chain::{builder_for, ChainBuilder};
pub use error::*;
pub use expand::*;
pub use group::{DeclarationGroup, OverrideChainEntry, TypeGroup};
pub use naming::{NameScope, MAX_NAME_ATTEMPTS};
pub use output::*;
pub use trace::*;

use chain::{link_member, original_member, ChainContext};

/// The outcome of linking.
#[derive(Debug, Clone, Default)]
pub struct LinkResult {
    /// The linked types, sorted by declaration id.
    pub output: LinkedOutput,
    /// The problems found linking, in type order. A declaration that failed is emitted unchanged.
    pub diagnostics: DiagnosticContext,
}

/// Links a store of transformations against the final declaration tree.
pub struct Linker<'a> {
    tree: &'a DeclarationTree,
    store: &'a TransformationStore,
    order: &'a AspectLayerOrder,
    expander: &'a dyn TemplateExpander,
    num_workers: usize,
}

impl<'a> Linker<'a> {
    /// A linker using the [`DefaultExpander`] and a worker per CPU.
    pub fn new(
        tree: &'a DeclarationTree,
        store: &'a TransformationStore,
        order: &'a AspectLayerOrder,
    ) -> Linker<'a> {
        Linker {
            tree,
            store,
            order,
            expander: &DefaultExpander,
            num_workers: num_cpus::get(),
        }
    }

    /// Use a different template expander.
    pub fn with_expander(mut self, expander: &'a dyn TemplateExpander) -> Self {
        self.expander = expander;
        self
    }

    /// Use at most this number of threads.
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    /// Link all the types of the tree. The output doesn't depend on the number of workers.
    pub fn link(&self) -> LinkResult {
        let mut diagnostics = Vec::new();
        let groups = group::group_by_type(self.tree, self.store, self.order, &mut diagnostics);
        let num_workers = self.num_workers.clamp(1, groups.len().max(1));
        info!(
            "Linking {} types ({} transformations) with {} workers",
            groups.len(),
            self.store.len(),
            num_workers
        );

        let (sender, receiver) = unbounded();
        for group in groups {
            // the receiver is alive until the workers are joined
            if let Err(e) = sender.send(group) {
                error!("Cannot queue the type {} for linking: {}", e.0.ty, e);
            }
        }
        drop(sender);

        let mut linked = thread::scope(|scope| {
            let mut workers = Vec::new();
            for i in 1..num_workers {
                let receiver = receiver.clone();
                let spawned = thread::Builder::new()
                    .name(format!("Linker worker {}", i))
                    .spawn_scoped(scope, move || self.work(receiver));
                match spawned {
                    Ok(handle) => workers.push(handle),
                    Err(e) => warn!("Failed to spawn linker worker {}: {}", i, e),
                }
            }
            // the current thread is a worker too
            let mut linked = self.work(receiver.clone());
            for worker in workers {
                match worker.join() {
                    Ok(result) => linked.extend(result),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            linked
        });
        linked.sort_by_key(|(ty, _)| ty.declaration);

        let mut context = DiagnosticContext::new();
        context.extend(diagnostics);
        let mut output = LinkedOutput::default();
        for (ty, diagnostics) in linked {
            context.extend(diagnostics);
            output.types.push(ty);
        }
        LinkResult {
            output,
            diagnostics: context,
        }
    }

    fn work(&self, receiver: Receiver<TypeGroup>) -> Vec<(LinkedType, Vec<Diagnostic>)> {
        let mut linked = Vec::new();
        while let Ok(group) = receiver.recv() {
            if let Some(result) = self.link_type(&group) {
                linked.push(result);
            }
        }
        linked
    }

    /// Link all the members of a type, in declaration order.
    fn link_type(&self, group: &TypeGroup) -> Option<(LinkedType, Vec<Diagnostic>)> {
        let tree = self.tree;
        let ty = tree.get(group.ty)?;
        let path = tree.path(ty.id);
        debug!("Linking {}", path);
        let mut scope = NameScope::for_type(tree, ty.id);
        let mut diagnostics = Vec::new();
        let mut members = Vec::new();
        let mut backing_fields = Vec::new();
        let unchanged = DeclarationGroup::default();

        for declaration in tree.members_of(ty.id) {
            let member_group = group.members.get(&declaration.id).unwrap_or(&unchanged);
            let ctx = ChainContext {
                tree,
                declaration,
                group: member_group,
                expander: self.expander,
            };
            // the names of a failed chain must not be taken
            let mut local_scope = if member_group.is_chained() {
                Some(scope.clone())
            } else {
                None
            };
            let result = link_member(&ctx, local_scope.as_mut().unwrap_or(&mut scope));
            match result {
                Ok(chain) => {
                    if let Some(local_scope) = local_scope {
                        scope = local_scope;
                    }
                    members.extend(chain.members);
                    backing_fields.extend(chain.backing_fields);
                }
                Err(err) => {
                    warn!("Failed to link {}: {}", tree.path(declaration.id), err);
                    let mut diagnostic = Diagnostic::error(format!(
                        "Cannot link the {} {}: {}",
                        declaration.kind, declaration.name, err
                    ))
                    .with_location(tree.path(declaration.id));
                    if let Some(entry) = member_group.overrides.last() {
                        diagnostic = diagnostic.with_origin(entry.layer.to_string());
                    }
                    if declaration.is_introduced() {
                        diagnostic = diagnostic.with_note("The introduced member is dropped");
                    } else {
                        diagnostic =
                            diagnostic.with_note("The member is emitted without its overrides");
                        members.push(original_member(declaration));
                    }
                    diagnostics.push(diagnostic);
                }
            }
        }

        let has_constructor = tree
            .members_of(ty.id)
            .any(|m| m.kind == DeclarationKind::Constructor);
        if ty.is_value_type && !backing_fields.is_empty() && !has_constructor {
            debug!("Materializing the default constructor of {}", path);
            let body = Body::text(backing_fields.iter().map(|f| format!("{} = default;", f)));
            let mut accessors = BTreeMap::new();
            accessors.insert(Accessor::Invoke, LinkedBody::Block(body));
            members.push(LinkedMember {
                name: CONSTRUCTOR_NAME.to_string(),
                kind: DeclarationKind::Constructor,
                accessibility: Accessibility::Public,
                signature: Signature::new(),
                type_parameters: vec![],
                is_new: false,
                is_implicit: true,
                accessors,
                origin: MemberOrigin::ImplicitConstructor,
            });
        }

        Some((
            LinkedType {
                declaration: ty.id,
                path,
                name: ty.name.clone(),
                is_value_type: ty.is_value_type,
                type_parameters: ty.type_parameters.clone(),
                members,
            },
            diagnostics,
        ))
    }
}
