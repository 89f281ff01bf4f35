use std::collections::HashSet;

use weaver_model::{DeclarationId, DeclarationKind, DeclarationTree};

use crate::LinkError;

/// How many disambiguated variants of a name are tried before giving up.
pub const MAX_NAME_ATTEMPTS: usize = 1000;

/// The identifiers visible inside a declaring type. Every name generated for the chains of the
/// type is allocated here, so generated names never collide with each other or with the source.
#[derive(Debug, Clone)]
pub struct NameScope {
    taken: HashSet<String>,
    max_attempts: usize,
}

impl NameScope {
    /// An empty scope.
    pub fn new() -> NameScope {
        NameScope {
            taken: HashSet::new(),
            max_attempts: MAX_NAME_ATTEMPTS,
        }
    }

    /// The scope of a type: its name, the type parameters of the type and of its enclosing types,
    /// the names of all its children and the type parameters of its members.
    pub fn for_type(tree: &DeclarationTree, ty: DeclarationId) -> NameScope {
        let mut scope = NameScope::new();
        if let Some(decl) = tree.get(ty) {
            scope.reserve(&decl.name);
        }
        let mut enclosing = tree.get(ty);
        while let Some(decl) = enclosing.filter(|d| d.kind == DeclarationKind::Type) {
            for param in &decl.type_parameters {
                scope.reserve(param);
            }
            enclosing = decl.parent.and_then(|p| tree.get(p));
        }
        for child in tree.children(ty).iter().filter_map(|c| tree.get(*c)) {
            scope.reserve(&child.name);
            for param in &child.type_parameters {
                scope.reserve(param);
            }
        }
        scope
    }

    /// Limit the number of variants tried by [`NameScope::allocate`].
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Mark a name as used. Returns `false` if it already was.
    pub fn reserve(&mut self, name: &str) -> bool {
        self.taken.insert(name.to_string())
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    /// Allocate a fresh name derived from `base`: `base` itself if free, otherwise `base_2`,
    /// `base_3`, ...
    pub fn allocate(&mut self, base: &str) -> Result<String, LinkError> {
        for attempt in 1..=self.max_attempts {
            let candidate = if attempt == 1 {
                base.to_string()
            } else {
                format!("{}_{}", base, attempt)
            };
            if self.reserve(&candidate) {
                return Ok(candidate);
            }
        }
        Err(LinkError::NamesExhausted {
            base: base.to_string(),
            attempts: self.max_attempts,
        })
    }
}

impl Default for NameScope {
    fn default() -> Self {
        NameScope::new()
    }
}

/// The name of the private backing field of a member: `Count` becomes `_count`.
pub fn backing_field_name(member: &str) -> String {
    let mut chars = member.chars();
    match chars.next() {
        Some(first) => format!("_{}{}", first.to_lowercase(), chars.as_str()),
        None => "_value".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use weaver_model::{Declaration, DeclarationKind};

    use super::*;

    #[test]
    fn test_allocate_disambiguates() {
        let mut tree = DeclarationTree::new();
        let ty = tree.insert(
            None,
            Declaration::new("Service", DeclarationKind::Type).with_type_parameters(["T"]),
        );
        tree.insert(Some(ty), Declaration::new("Foo", DeclarationKind::Method));
        tree.insert(Some(ty), Declaration::new("Foo_Log", DeclarationKind::Method));
        tree.insert(Some(ty), Declaration::new("Foo_Log_2", DeclarationKind::Property));
        let mut scope = NameScope::for_type(&tree, ty);
        assert_eq!(scope.allocate("Foo_Log").unwrap(), "Foo_Log_3");
        assert_eq!(scope.allocate("Foo_Log").unwrap(), "Foo_Log_4");
        assert_eq!(scope.allocate("Foo_Cache").unwrap(), "Foo_Cache");
        assert_eq!(scope.allocate("T").unwrap(), "T_2");
        assert_eq!(scope.allocate("Service").unwrap(), "Service_2");
    }

    #[test]
    fn test_enclosing_type_parameters() {
        let mut tree = DeclarationTree::new();
        let ns = tree.insert(None, Declaration::new("App", DeclarationKind::Namespace));
        let outer = tree.insert(
            Some(ns),
            Declaration::new("Outer", DeclarationKind::Type).with_type_parameters(["Foo_Source"]),
        );
        let inner = tree.insert(Some(outer), Declaration::new("Inner", DeclarationKind::Type));
        tree.insert(Some(inner), Declaration::new("Foo", DeclarationKind::Method));
        let mut scope = NameScope::for_type(&tree, inner);
        assert_eq!(scope.allocate("Foo_Source").unwrap(), "Foo_Source_2");
    }

    #[test]
    fn test_default_scope_allocates() {
        let mut scope = NameScope::default();
        assert_eq!(scope.allocate("Foo").unwrap(), "Foo");
        assert_eq!(scope.allocate("Foo").unwrap(), "Foo_2");
    }

    #[test]
    fn test_exhaustion() {
        let mut scope = NameScope::new().with_max_attempts(2);
        scope.reserve("Foo");
        scope.reserve("Foo_2");
        assert_eq!(
            scope.allocate("Foo"),
            Err(LinkError::NamesExhausted {
                base: "Foo".into(),
                attempts: 2
            })
        );
    }

    #[test]
    fn test_backing_field_name() {
        assert_eq!(backing_field_name("Count"), "_count");
        assert_eq!(backing_field_name("value"), "_value");
    }
}
