use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Accessibility, Accessor, AspectLayerId, DeclarationId, DeclarationKind, OverrideStrategy,
    Signature, Template,
};

/// A concrete transformation request, produced while evaluating an aspect instance and executed
/// in the step of its layer at the depth of its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advice {
    pub uuid: Uuid,
    /// The aspect instance that produced this advice.
    pub aspect_instance: Uuid,
    pub target: DeclarationId,
    /// The layer in which this advice is executed.
    pub layer: AspectLayerId,
    pub kind: AdviceKind,
    /// Arguments available to the templates of this advice.
    pub arguments: BTreeMap<String, String>,
}

/// What an [`Advice`] asks to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdviceKind {
    /// Override some accessors of the target.
    Override {
        templates: BTreeMap<Accessor, Template>,
    },
    /// Introduce a new member in the target type.
    Introduce {
        member: IntroducedMember,
        /// What to do if a member with the same signature already exists.
        when_exists: OverrideStrategy,
    },
    /// Add a precondition or a postcondition to an accessor of the target.
    AddContract {
        accessor: Accessor,
        direction: ContractDirection,
        template: Template,
    },
    /// Make the target forward all its accessors to another member of the same type.
    Redirect { to: DeclarationId },
    /// Produce an additional artifact next to the output.
    AddResource { name: String, content: String },
}

impl AdviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdviceKind::Override { .. } => "override",
            AdviceKind::Introduce { .. } => "introduce",
            AdviceKind::AddContract { .. } => "contract",
            AdviceKind::Redirect { .. } => "redirect",
            AdviceKind::AddResource { .. } => "resource",
        }
    }
}

/// Whether a contract is checked on the way in or on the way out of an accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContractDirection {
    /// Checked before calling the previous implementation.
    #[default]
    Input,
    /// Checked after the previous implementation returned.
    Output,
}

/// Description of a member to introduce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntroducedMember {
    pub name: String,
    pub kind: DeclarationKind,
    pub signature: Signature,
    pub accessibility: Accessibility,
    /// Whether the accessors are compiler generated (auto-property, field-like event).
    pub is_auto: bool,
    /// The bodies of the accessors. Missing accessors of a non-auto member are empty.
    pub templates: BTreeMap<Accessor, Template>,
}

impl IntroducedMember {
    pub fn new(name: impl Into<String>, kind: DeclarationKind) -> IntroducedMember {
        IntroducedMember {
            name: name.into(),
            kind,
            signature: Signature::default(),
            accessibility: Accessibility::Public,
            is_auto: false,
            templates: BTreeMap::new(),
        }
    }

    pub fn with_template(mut self, accessor: Accessor, template: Template) -> Self {
        self.templates.insert(accessor, template);
        self
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    pub fn auto(mut self) -> Self {
        self.is_auto = true;
        self
    }
}

impl Advice {
    pub fn new(
        aspect_instance: Uuid,
        target: DeclarationId,
        layer: AspectLayerId,
        kind: AdviceKind,
    ) -> Advice {
        Advice {
            uuid: Uuid::new_v4(),
            aspect_instance,
            target,
            layer,
            kind,
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Shorthand for an override of a single accessor.
    pub fn override_accessor(
        aspect_instance: Uuid,
        target: DeclarationId,
        layer: AspectLayerId,
        accessor: Accessor,
        template: Template,
    ) -> Advice {
        let mut templates = BTreeMap::new();
        templates.insert(accessor, template);
        Advice::new(
            aspect_instance,
            target,
            layer,
            AdviceKind::Override { templates },
        )
    }
}
