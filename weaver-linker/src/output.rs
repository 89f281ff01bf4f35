use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use weaver_model::{
    Accessibility, Accessor, AspectLayerId, Body, DeclarationId, DeclarationKind, Signature,
};

/// The final implementation of an accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkedBody {
    /// Left to the compiler.
    Auto,
    /// Explicit body, with every proceed reference resolved.
    Block(Body),
}

/// Why a member is part of the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberOrigin {
    /// Written in the source.
    Source,
    /// Introduced by an aspect.
    Introduced { layer: AspectLayerId },
    /// Holds the original implementation of a chained member.
    ChainBase { of: String },
    /// Holds the implementation of an override of a chained member.
    ChainEntry { of: String, layer: AspectLayerId },
    /// The storage of a member whose automatic implementation has been materialized.
    BackingField { of: String },
    /// Default constructor of a value type whose fields gained an initializer.
    ImplicitConstructor,
}

/// A member of a [`LinkedType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedMember {
    pub name: String,
    pub kind: DeclarationKind,
    pub accessibility: Accessibility,
    pub signature: Signature,
    pub type_parameters: Vec<String>,
    /// Whether the member hides an existing member with the same signature.
    pub is_new: bool,
    pub is_implicit: bool,
    pub accessors: BTreeMap<Accessor, LinkedBody>,
    pub origin: MemberOrigin,
}

impl LinkedMember {
    /// The body of an accessor, if explicit.
    pub fn body(&self, accessor: Accessor) -> Option<&Body> {
        match self.accessors.get(&accessor) {
            Some(LinkedBody::Block(body)) => Some(body),
            _ => None,
        }
    }
}

/// A type of the output with its final list of members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedType {
    /// The type in the final declaration tree.
    pub declaration: DeclarationId,
    /// The dotted path of the type.
    pub path: String,
    pub name: String,
    pub is_value_type: bool,
    pub type_parameters: Vec<String>,
    pub members: Vec<LinkedMember>,
}

impl LinkedType {
    /// The first member named `name`.
    pub fn member(&self, name: &str) -> Option<&LinkedMember> {
        self.members.iter().find(|m| m.name == name)
    }

    /// The names of all the members, in output order.
    pub fn member_names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name.as_str()).collect()
    }
}

/// The compiled output: every type of the program, sorted by declaration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LinkedOutput {
    pub types: Vec<LinkedType>,
}

impl LinkedOutput {
    /// Find a type by its dotted path.
    pub fn find_type(&self, path: &str) -> Option<&LinkedType> {
        self.types.iter().find(|t| t.path == path)
    }

    /// Find a member by its dotted path, e.g. `App.Service.Foo`.
    pub fn find_member(&self, path: &str) -> Option<(&LinkedType, &LinkedMember)> {
        let (ty, member) = path.rsplit_once('.')?;
        let ty = self.find_type(ty)?;
        ty.member(member).map(|m| (ty, m))
    }
}
