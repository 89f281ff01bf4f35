use thiserror::Error;

use weaver_model::{Accessor, Statement};

use crate::{LinkedBody, LinkedType};

/// The default bound on the nesting of the traced calls.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// An error tracing the calls of a linked type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("unknown member '{name}'")]
    UnknownMember { name: String },
    #[error("member '{name}' has no {accessor} accessor")]
    MissingAccessor { name: String, accessor: Accessor },
    #[error("calls nested deeper than {max_depth} levels")]
    TooDeep { max_depth: usize },
    #[error("unresolved statement in '{name}': {statement}")]
    Unresolved { name: String, statement: String },
}

/// Interprets the linked bodies of a type, recording the emitted markers. Text statements are
/// opaque and skipped, calls are followed.
#[derive(Debug, Clone, Copy)]
pub struct CallTracer<'a> {
    ty: &'a LinkedType,
    max_depth: usize,
}

impl<'a> CallTracer<'a> {
    pub fn new(ty: &'a LinkedType) -> CallTracer<'a> {
        CallTracer {
            ty,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Call an accessor of a member and return the markers emitted, in order.
    pub fn trace(&self, member: &str, accessor: Accessor) -> Result<Vec<String>, TraceError> {
        let mut markers = Vec::new();
        self.call(member, accessor, 0, &mut markers)?;
        Ok(markers)
    }

    fn call(
        &self,
        name: &str,
        accessor: Accessor,
        depth: usize,
        markers: &mut Vec<String>,
    ) -> Result<(), TraceError> {
        if depth >= self.max_depth {
            return Err(TraceError::TooDeep {
                max_depth: self.max_depth,
            });
        }
        let member = self
            .ty
            .member(name)
            .ok_or_else(|| TraceError::UnknownMember {
                name: name.to_string(),
            })?;
        let body = match member.accessors.get(&accessor) {
            Some(LinkedBody::Block(body)) => body,
            Some(LinkedBody::Auto) => return Ok(()),
            None => {
                return Err(TraceError::MissingAccessor {
                    name: name.to_string(),
                    accessor,
                })
            }
        };
        for statement in &body.statements {
            match statement {
                Statement::Text(_) => {}
                Statement::Emit(marker) => markers.push(marker.clone()),
                Statement::Invoke(invocation) => {
                    self.call(&invocation.member, invocation.accessor, depth + 1, markers)?
                }
                Statement::Proceed(_) => {
                    return Err(TraceError::Unresolved {
                        name: name.to_string(),
                        statement: statement.to_string(),
                    })
                }
            }
        }
        Ok(())
    }
}
