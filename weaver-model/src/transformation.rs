use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Accessor, Advice, AspectLayerId, DeclarationId, Template};

/// Whether a transformation changes the declaration tree seen by the later steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Observability {
    /// The transformation is folded into the next snapshot of the tree.
    Observable,
    /// The transformation is visible only to the linker.
    None,
}

/// The semantic of a transformation, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformationSemantic {
    Introduction,
    Override,
    Redirect,
}

impl Display for TransformationSemantic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformationSemantic::Introduction => f.write_str("introduction"),
            TransformationSemantic::Override => f.write_str("override"),
            TransformationSemantic::Redirect => f.write_str("redirect"),
        }
    }
}

/// What to do when an introduced member has the same signature of an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverrideStrategy {
    /// Report an error, nothing is introduced.
    #[default]
    Fail,
    /// Drop the introduction, the existing member is untouched.
    Ignore,
    /// The existing member becomes the base of a chain whose next entry is the introduced body.
    Override,
    /// Keep both members, the introduced one hides the existing one.
    New,
}

/// Payload of a [`Transformation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformationKind {
    /// A new member has been added to the target type.
    Introduction {
        /// The introduced declaration, present in the snapshot produced by the step.
        member: DeclarationId,
        /// The bodies of the introduced accessors.
        templates: BTreeMap<Accessor, Template>,
        /// The existing member hidden by this one.
        hides: Option<DeclarationId>,
    },
    /// Some accessors of the target are overridden.
    Override {
        templates: BTreeMap<Accessor, Template>,
    },
    /// All the accessors of the target forward to another member.
    Redirect { to: DeclarationId },
}

/// An immutable result of the evaluation of an advice, consumed by the linker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transformation {
    /// Creation order of the transformation inside the store.
    pub ordinal: usize,
    /// The advice that produced this transformation.
    pub advice: Uuid,
    pub layer: AspectLayerId,
    /// The declaration the advice was about. For introductions this is the declaring type.
    pub target: DeclarationId,
    pub observability: Observability,
    pub kind: TransformationKind,
    /// Arguments of the templates.
    pub arguments: BTreeMap<String, String>,
}

impl Transformation {
    /// Make a transformation for an advice, targeting the advice target.
    pub fn from_advice(
        advice: &Advice,
        observability: Observability,
        kind: TransformationKind,
    ) -> Transformation {
        Transformation {
            ordinal: 0,
            advice: advice.uuid,
            layer: advice.layer.clone(),
            target: advice.target,
            observability,
            kind,
            arguments: advice.arguments.clone(),
        }
    }

    /// Retarget this transformation to another declaration.
    pub fn with_target(mut self, target: DeclarationId) -> Self {
        self.target = target;
        self
    }

    /// The declaration whose final shape is affected by this transformation: the introduced
    /// member for introductions, the target for the others.
    pub fn subject(&self) -> DeclarationId {
        match &self.kind {
            TransformationKind::Introduction { member, .. } => *member,
            _ => self.target,
        }
    }

    pub fn semantic(&self) -> TransformationSemantic {
        match &self.kind {
            TransformationKind::Introduction { .. } => TransformationSemantic::Introduction,
            TransformationKind::Override { .. } => TransformationSemantic::Override,
            TransformationKind::Redirect { .. } => TransformationSemantic::Redirect,
        }
    }

    pub fn is_observable(&self) -> bool {
        self.observability == Observability::Observable
    }
}
