use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{AspectLayerId, Body};

/// Name of the constructors.
pub const CONSTRUCTOR_NAME: &str = ".ctor";
/// Reserved name of the finalizers.
pub const FINALIZER_NAME: &str = "Finalize";
/// Reserved name of the indexers.
pub const INDEXER_NAME: &str = "Item";

/// The identifier of a declaration inside a [`DeclarationTree`]. Identifiers are never reused, so
/// they stay valid in every revised snapshot of the tree.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct DeclarationId(u32);

impl DeclarationId {
    /// The position of the declaration inside the tree.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for DeclarationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    Namespace,
    Type,
    Method,
    Property,
    Indexer,
    Event,
    Constructor,
    Operator,
    Finalizer,
    Field,
}

/// The implementation points of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessor {
    /// The body of a method, constructor, operator or finalizer.
    Invoke,
    Get,
    Set,
    Add,
    Remove,
}

impl DeclarationKind {
    /// Whether this declaration is a member of a type.
    pub fn is_member(&self) -> bool {
        !matches!(self, DeclarationKind::Namespace | DeclarationKind::Type)
    }

    /// Whether this declaration can be the target of an override.
    pub fn is_overridable(&self) -> bool {
        self.is_member()
    }

    /// The accessors a declaration of this kind can have.
    pub fn accessors(&self) -> &'static [Accessor] {
        match self {
            DeclarationKind::Namespace | DeclarationKind::Type => &[],
            DeclarationKind::Method
            | DeclarationKind::Constructor
            | DeclarationKind::Operator
            | DeclarationKind::Finalizer => &[Accessor::Invoke],
            DeclarationKind::Property | DeclarationKind::Indexer | DeclarationKind::Field => {
                &[Accessor::Get, Accessor::Set]
            }
            DeclarationKind::Event => &[Accessor::Add, Accessor::Remove],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationKind::Namespace => "namespace",
            DeclarationKind::Type => "type",
            DeclarationKind::Method => "method",
            DeclarationKind::Property => "property",
            DeclarationKind::Indexer => "indexer",
            DeclarationKind::Event => "event",
            DeclarationKind::Constructor => "constructor",
            DeclarationKind::Operator => "operator",
            DeclarationKind::Finalizer => "finalizer",
            DeclarationKind::Field => "field",
        }
    }
}

impl Display for DeclarationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Accessor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Accessor::Invoke => "invoke",
            Accessor::Get => "get",
            Accessor::Set => "set",
            Accessor::Add => "add",
            Accessor::Remove => "remove",
        }
    }
}

impl Display for Accessor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Accessor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoke" => Ok(Accessor::Invoke),
            "get" => Ok(Accessor::Get),
            "set" => Ok(Accessor::Set),
            "add" => Ok(Accessor::Add),
            "remove" => Ok(Accessor::Remove),
            _ => Err(format!("Unknown accessor: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    #[default]
    Public,
    Protected,
    Internal,
    Private,
}

impl Accessibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Accessibility::Public => "public",
            Accessibility::Protected => "protected",
            Accessibility::Internal => "internal",
            Accessibility::Private => "private",
        }
    }
}

/// A parameter of a method, constructor, operator or indexer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

/// The signature of a member. Two members have the same signature if their parameter types
/// match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Signature {
    pub parameters: Vec<Parameter>,
    /// The type of the value, `None` for `void` members.
    pub return_type: Option<String>,
}

impl Signature {
    pub fn new() -> Signature {
        Signature::default()
    }

    pub fn parameter(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }

    pub fn returning(mut self, ty: impl Into<String>) -> Self {
        self.return_type = Some(ty.into());
        self
    }

    /// Whether the parameter types of the two signatures are the same.
    pub fn matches(&self, other: &Signature) -> bool {
        self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .zip(other.parameters.iter())
                .all(|(a, b)| a.ty == b.ty)
    }

    /// The comma separated list of the parameter types.
    pub fn parameter_types(&self) -> String {
        self.parameters.iter().map(|p| p.ty.as_str()).join(",")
    }
}

/// How an accessor of a declaration is implemented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Implementation {
    /// Compiler-generated accessor (auto-property, field-like event).
    Auto,
    /// Explicit body.
    Block(Body),
    /// The declaration has been introduced by an aspect, its body is the introduction template.
    Introduced,
}

/// Where a declaration comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclarationOrigin {
    /// The declaration is part of the original program.
    Source,
    /// The declaration has been introduced by an advice of this layer.
    Introduced { layer: AspectLayerId },
}

/// A node of the [`DeclarationTree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    /// Identifier of the declaration, assigned when inserted in the tree.
    pub id: DeclarationId,
    /// Name of the declaration. Operators, finalizers, indexers and constructors use their
    /// reserved names.
    pub name: String,
    pub kind: DeclarationKind,
    /// The containing declaration, `None` for the roots.
    pub parent: Option<DeclarationId>,
    /// Nesting depth: roots are at depth 0.
    pub depth: i32,
    /// Whether the declaration is not written in the source (e.g. a default constructor).
    pub is_implicit: bool,
    /// For types: whether this is a value type.
    pub is_value_type: bool,
    pub accessibility: Accessibility,
    pub signature: Signature,
    pub type_parameters: Vec<String>,
    /// The implementations of the accessors of this declaration.
    pub accessors: BTreeMap<Accessor, Implementation>,
    pub origin: DeclarationOrigin,
    /// The declaration that is hidden (`new` modifier) by this one.
    pub hides: Option<DeclarationId>,
}

impl Declaration {
    /// Make a new declaration, not yet part of a tree.
    pub fn new(name: impl Into<String>, kind: DeclarationKind) -> Declaration {
        Declaration {
            id: DeclarationId::default(),
            name: name.into(),
            kind,
            parent: None,
            depth: 0,
            is_implicit: false,
            is_value_type: false,
            accessibility: Accessibility::Public,
            signature: Signature::default(),
            type_parameters: Vec::new(),
            accessors: BTreeMap::new(),
            origin: DeclarationOrigin::Source,
            hides: None,
        }
    }

    pub fn with_body(mut self, accessor: Accessor, body: Body) -> Self {
        self.accessors.insert(accessor, Implementation::Block(body));
        self
    }

    pub fn with_auto_accessor(mut self, accessor: Accessor) -> Self {
        self.accessors.insert(accessor, Implementation::Auto);
        self
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_type_parameters<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.type_parameters = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    pub fn value_type(mut self) -> Self {
        self.is_value_type = true;
        self
    }

    pub fn implicit(mut self) -> Self {
        self.is_implicit = true;
        self
    }

    pub fn introduced_by(mut self, layer: AspectLayerId) -> Self {
        self.origin = DeclarationOrigin::Introduced { layer };
        self
    }

    /// Whether at least one accessor is compiler-generated. Fields count as auto.
    pub fn is_auto(&self) -> bool {
        self.kind == DeclarationKind::Field
            || self
                .accessors
                .values()
                .any(|i| matches!(i, Implementation::Auto))
    }

    pub fn is_introduced(&self) -> bool {
        matches!(self.origin, DeclarationOrigin::Introduced { .. })
    }

    /// The accessors this declaration has. Fields behave like a property with both accessors.
    pub fn accessor_list(&self) -> Vec<Accessor> {
        if self.kind == DeclarationKind::Field {
            return vec![Accessor::Get, Accessor::Set];
        }
        self.accessors.keys().copied().collect()
    }

    /// The body of an accessor, if it's explicitly implemented.
    pub fn body(&self, accessor: Accessor) -> Option<&Body> {
        match self.accessors.get(&accessor) {
            Some(Implementation::Block(body)) => Some(body),
            _ => None,
        }
    }

    /// Whether a member named `name` of kind `kind` with this signature cannot coexist with this
    /// declaration in the same type.
    pub fn conflicts_with(&self, name: &str, kind: DeclarationKind, signature: &Signature) -> bool {
        if self.name != name || !self.kind.is_member() || !kind.is_member() {
            return false;
        }
        let overloadable = |k: DeclarationKind| {
            matches!(
                k,
                DeclarationKind::Method
                    | DeclarationKind::Operator
                    | DeclarationKind::Indexer
                    | DeclarationKind::Constructor
            )
        };
        if overloadable(self.kind) && overloadable(kind) {
            return self.signature.matches(signature);
        }
        true
    }
}

/// Immutable-by-convention structural view of the program. The pipeline never mutates a
/// snapshot that has been shared: revisions are produced by cloning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationTree {
    declarations: Vec<Declaration>,
    children: Vec<Vec<DeclarationId>>,
}

impl DeclarationTree {
    /// Create an empty tree.
    pub fn new() -> DeclarationTree {
        DeclarationTree::default()
    }

    /// Insert a declaration as a child of `parent`, returning its identifier. The depth and the
    /// parent of the declaration are overwritten.
    ///
    /// Panics if `parent` is not part of the tree.
    pub fn insert(&mut self, parent: Option<DeclarationId>, mut declaration: Declaration) -> DeclarationId {
        let id = DeclarationId(self.declarations.len() as u32);
        declaration.id = id;
        declaration.parent = parent;
        declaration.depth = match parent {
            Some(parent) => {
                assert!(
                    parent.index() < self.declarations.len(),
                    "Unknown parent declaration {}",
                    parent
                );
                self.children[parent.index()].push(id);
                self.declarations[parent.index()].depth + 1
            }
            None => 0,
        };
        self.declarations.push(declaration);
        self.children.push(Vec::new());
        id
    }

    pub fn get(&self, id: DeclarationId) -> Option<&Declaration> {
        self.declarations.get(id.index())
    }

    pub fn contains(&self, id: DeclarationId) -> bool {
        id.index() < self.declarations.len()
    }

    /// The nesting depth of a declaration.
    pub fn depth_of(&self, id: DeclarationId) -> Option<i32> {
        self.get(id).map(|d| d.depth)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Iterate all the declarations, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations.iter()
    }

    pub fn children(&self, id: DeclarationId) -> &[DeclarationId] {
        self.children
            .get(id.index())
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    /// The members (not the nested types) of a type, in declaration order.
    pub fn members_of(&self, id: DeclarationId) -> impl Iterator<Item = &Declaration> {
        self.children(id)
            .iter()
            .filter_map(move |c| self.get(*c))
            .filter(|d| d.kind.is_member())
    }

    /// All the types of the tree, in insertion order.
    pub fn types(&self) -> impl Iterator<Item = &Declaration> {
        self.declarations
            .iter()
            .filter(|d| d.kind == DeclarationKind::Type)
    }

    /// The nearest type containing the declaration (excluding itself).
    pub fn declaring_type(&self, id: DeclarationId) -> Option<&Declaration> {
        let mut current = self.get(id)?.parent;
        while let Some(parent) = current {
            let decl = self.get(parent)?;
            if decl.kind == DeclarationKind::Type {
                return Some(decl);
            }
            current = decl.parent;
        }
        None
    }

    /// The dotted path of a declaration, e.g. `App.Service.Foo`.
    pub fn path(&self, id: DeclarationId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            match self.get(id) {
                Some(decl) => {
                    names.push(decl.name.as_str());
                    current = decl.parent;
                }
                None => break,
            }
        }
        names.iter().rev().join(".")
    }

    /// Find a declaration by its dotted path. Overloads can be selected appending the parameter
    /// types, e.g. `App.Service.Foo(int,string)`.
    pub fn find_by_path(&self, path: &str) -> Option<DeclarationId> {
        let (path, parameters) = match path.find('(') {
            Some(pos) if path.ends_with(')') => {
                (&path[..pos], Some(path[pos + 1..path.len() - 1].replace(' ', "")))
            }
            _ => (path, None),
        };
        self.declarations
            .iter()
            .filter(|d| match &parameters {
                Some(parameters) => &d.signature.parameter_types() == parameters,
                None => true,
            })
            .find(|d| self.path(d.id) == path)
            .map(|d| d.id)
    }

    /// Find the member of `ty` that would conflict with a member with this name, kind and
    /// signature.
    pub fn find_member(
        &self,
        ty: DeclarationId,
        name: &str,
        kind: DeclarationKind,
        signature: &Signature,
    ) -> Option<DeclarationId> {
        self.members_of(ty)
            .find(|m| m.conflicts_with(name, kind, signature))
            .map(|m| m.id)
    }

    /// Whether `id` is `ancestor` or one of its descendants.
    pub fn is_within(&self, id: DeclarationId, ancestor: DeclarationId) -> bool {
        let mut current = Some(id);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).and_then(|d| d.parent);
        }
        false
    }
}

/// The reserved metadata name of an operator, given its symbol.
pub fn reserved_operator_name(symbol: &str) -> Option<&'static str> {
    let name = match symbol {
        "+" => "op_Addition",
        "-" => "op_Subtraction",
        "*" => "op_Multiply",
        "/" => "op_Division",
        "%" => "op_Modulus",
        "==" => "op_Equality",
        "!=" => "op_Inequality",
        "<" => "op_LessThan",
        ">" => "op_GreaterThan",
        "<=" => "op_LessThanOrEqual",
        ">=" => "op_GreaterThanOrEqual",
        "!" => "op_LogicalNot",
        "~" => "op_OnesComplement",
        "++" => "op_Increment",
        "--" => "op_Decrement",
        "&" => "op_BitwiseAnd",
        "|" => "op_BitwiseOr",
        "^" => "op_ExclusiveOr",
        "<<" => "op_LeftShift",
        ">>" => "op_RightShift",
        "true" => "op_True",
        "false" => "op_False",
        "implicit" => "op_Implicit",
        "explicit" => "op_Explicit",
        _ => return None,
    };
    Some(name)
}
