use weaver_model::{Accessor, Declaration, DeclarationKind, INDEXER_NAME};

use crate::chain::ChainBuilder;

/// Properties, indexers and events: one chain per accessor. The chains of the accessors are
/// independent and can have different lengths.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessorChain;

impl ChainBuilder for AccessorChain {
    fn accessors(&self, declaration: &Declaration) -> Vec<Accessor> {
        let accessors = declaration.accessor_list();
        if accessors.is_empty() {
            declaration.kind.accessors().to_vec()
        } else {
            accessors
        }
    }

    fn stem(&self, declaration: &Declaration) -> String {
        match declaration.kind {
            DeclarationKind::Indexer => INDEXER_NAME.to_string(),
            _ => declaration.name.clone(),
        }
    }
}

/// Fields: as soon as a field is overridden it becomes a property stored in a backing field.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldChain;

impl ChainBuilder for FieldChain {
    fn accessors(&self, _declaration: &Declaration) -> Vec<Accessor> {
        vec![Accessor::Get, Accessor::Set]
    }

    fn entry_kind(&self, _declaration: &Declaration) -> DeclarationKind {
        DeclarationKind::Property
    }

    fn public_kind(&self, _declaration: &Declaration) -> DeclarationKind {
        DeclarationKind::Property
    }

    fn is_auto(&self, _declaration: &Declaration) -> bool {
        true
    }
}
