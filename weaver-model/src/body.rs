use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{Accessor, DeclarationId};

/// The implementation of a single accessor of a declaration (the `Invoke` accessor of a method,
/// the `get` of a property, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Body {
    /// The statements of the body, in order.
    pub statements: Vec<Statement>,
}

/// A statement of a [`Body`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    /// Opaque source text, emitted as-is.
    Text(String),
    /// Observable side effect: the marker is recorded when the body is traced.
    Emit(String),
    /// A not yet resolved call to the previous implementation of the chain.
    Proceed(ProceedReference),
    /// A call to another member of the same declaring type.
    Invoke(Invocation),
}

/// Late-bound descriptor of a proceed call. It is produced during template expansion and
/// replaced by an [`Invocation`] once the names of all the chain entries are known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProceedReference {
    /// The declaration whose chain is being built.
    pub declaration: DeclarationId,
    /// The slot of the chain to call.
    pub target: ChainSlot,
    /// The accessor of the slot to call.
    pub accessor: Accessor,
}

/// A position inside an override chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChainSlot {
    /// There is nothing to proceed to (e.g. the base of an introduced member): the call is
    /// dropped.
    Nothing,
    /// The original implementation: the source body, the introduced body or a redirection.
    Base,
    /// The implementation of the override with the given chain index.
    Entry(usize),
}

/// A resolved call to a member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Invocation {
    /// Name of the called member inside the declaring type.
    pub member: String,
    /// The accessor of the called member.
    pub accessor: Accessor,
}

impl Body {
    /// An empty body.
    pub fn new() -> Body {
        Body::default()
    }

    /// Build a body from a list of source lines. `emit <marker>` lines become [`Statement::Emit`],
    /// all the others are kept as text.
    pub fn text<I, S>(lines: I) -> Body
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let statements = lines
            .into_iter()
            .map(|line| {
                let line = line.as_ref().trim();
                match line.strip_prefix("emit ") {
                    Some(marker) => Statement::Emit(marker.trim().to_string()),
                    None => Statement::Text(line.to_string()),
                }
            })
            .collect();
        Body { statements }
    }

    /// A body that only calls another member.
    pub fn forward(member: impl Into<String>, accessor: Accessor) -> Body {
        Body {
            statements: vec![Statement::Invoke(Invocation {
                member: member.into(),
                accessor,
            })],
        }
    }

    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// All the proceed references still present in this body.
    pub fn proceeds(&self) -> impl Iterator<Item = &ProceedReference> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Proceed(proceed) => Some(proceed),
            _ => None,
        })
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Text(text) => f.write_str(text),
            Statement::Emit(marker) => write!(f, "emit {};", marker),
            Statement::Proceed(proceed) => write!(
                f,
                "proceed({}, {:?}, {});",
                proceed.declaration, proceed.target, proceed.accessor
            ),
            Statement::Invoke(invocation) => match invocation.accessor {
                Accessor::Invoke => write!(f, "this.{}(...);", invocation.member),
                Accessor::Get => write!(f, "return this.{};", invocation.member),
                Accessor::Set => write!(f, "this.{} = value;", invocation.member),
                Accessor::Add => write!(f, "this.{} += value;", invocation.member),
                Accessor::Remove => write!(f, "this.{} -= value;", invocation.member),
            },
        }
    }
}

/// The abstract template of an advice: turned into a concrete [`Body`] by a template expander.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Name of the template, used in the diagnostics.
    pub name: String,
    /// The lines of the template.
    pub lines: Vec<TemplateLine>,
}

/// A line of a [`Template`]. `Emit` and `Text` may contain `{argument}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateLine {
    /// Call the previous implementation.
    Proceed,
    /// Emit a marker.
    Emit(String),
    /// Opaque source text.
    Text(String),
}

impl Template {
    /// Parse a template from its lines: `proceed` (or `proceed()`) is a proceed call,
    /// `emit <marker>` emits a marker, every other line is text.
    pub fn parse<I, S>(name: impl Into<String>, lines: I) -> Template
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines = lines
            .into_iter()
            .map(|line| {
                let line = line.as_ref().trim();
                if line == "proceed" || line == "proceed()" || line == "proceed();" {
                    TemplateLine::Proceed
                } else if let Some(marker) = line.strip_prefix("emit ") {
                    TemplateLine::Emit(marker.trim().to_string())
                } else {
                    TemplateLine::Text(line.to_string())
                }
            })
            .collect();
        Template {
            name: name.into(),
            lines,
        }
    }

    /// Whether the template calls the previous implementation.
    pub fn proceeds(&self) -> bool {
        self.lines.iter().any(|l| matches!(l, TemplateLine::Proceed))
    }
}
