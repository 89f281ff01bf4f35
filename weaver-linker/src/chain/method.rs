use weaver_model::{
    reserved_operator_name, Accessor, Declaration, DeclarationKind, FINALIZER_NAME,
};

use crate::chain::ChainBuilder;

/// Methods, operators and finalizers: a single `Invoke` chain of private methods.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodChain;

impl ChainBuilder for MethodChain {
    fn accessors(&self, _declaration: &Declaration) -> Vec<Accessor> {
        vec![Accessor::Invoke]
    }

    fn stem(&self, declaration: &Declaration) -> String {
        match declaration.kind {
            DeclarationKind::Operator => reserved_operator_name(&declaration.name)
                .map(String::from)
                .unwrap_or_else(|| declaration.name.clone()),
            DeclarationKind::Finalizer => FINALIZER_NAME.to_string(),
            _ => declaration.name.clone(),
        }
    }

    fn entry_kind(&self, _declaration: &Declaration) -> DeclarationKind {
        DeclarationKind::Method
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_reserved_stems() {
        let op = Declaration::new("+", DeclarationKind::Operator);
        let reserved = Declaration::new("op_Equality", DeclarationKind::Operator);
        let finalizer = Declaration::new("~Service", DeclarationKind::Finalizer);
        assert_eq!(MethodChain.stem(&op), "op_Addition");
        assert_eq!(MethodChain.stem(&reserved), "op_Equality");
        assert_eq!(MethodChain.stem(&finalizer), "Finalize");
        assert_eq!(MethodChain.entry_kind(&op), DeclarationKind::Method);
    }
}
