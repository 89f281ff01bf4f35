use weaver_model::{Accessor, Declaration, DeclarationKind};

use crate::chain::ChainBuilder;

/// Constructors can't be renamed: every implementation becomes a private `Init_*` method and the
/// constructor just forwards to the last one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstructorChain;

impl ChainBuilder for ConstructorChain {
    fn accessors(&self, _declaration: &Declaration) -> Vec<Accessor> {
        vec![Accessor::Invoke]
    }

    fn stem(&self, _declaration: &Declaration) -> String {
        "Init".to_string()
    }

    fn entry_kind(&self, _declaration: &Declaration) -> DeclarationKind {
        DeclarationKind::Method
    }

    fn forwards_public(&self) -> bool {
        true
    }
}
