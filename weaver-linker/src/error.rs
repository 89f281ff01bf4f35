use thiserror::Error;

use weaver_model::{ChainSlot, DeclarationId};

/// An error expanding a template into a body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExpansionError {
    /// The template uses a placeholder that is not an argument of the advice.
    #[error("template '{template}' uses the undefined argument '{name}'")]
    MissingArgument {
        /// The name of the template.
        template: String,
        /// The name of the placeholder.
        name: String,
    },
    /// A custom expander could not expand the template.
    #[error("cannot expand template '{template}': {reason}")]
    Failed {
        /// The name of the template.
        template: String,
        /// Why the expansion failed.
        reason: String,
    },
}

/// An error synthesizing the chain of a declaration. It affects only that declaration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error(transparent)]
    Expansion(#[from] ExpansionError),
    /// All the disambiguated variants of a name are taken.
    #[error("no free identifier derived from '{base}' after {attempts} attempts")]
    NamesExhausted { base: String, attempts: usize },
    /// A proceed reference points to a chain slot that has no member.
    #[error("proceed of {declaration} to {slot:?} cannot be resolved")]
    UnresolvedProceed {
        declaration: DeclarationId,
        slot: ChainSlot,
    },
    /// An introduced member has the same signature of another member and does not hide it.
    #[error("{name} conflicts with another member of the type")]
    Conflict { name: String },
    /// The declaration is redirected to a member that is not part of the tree.
    #[error("redirect to the unknown declaration {to}")]
    UnknownRedirect { to: DeclarationId },
}
