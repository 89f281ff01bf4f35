use std::collections::BTreeMap;

use weaver_model::{Body, ChainSlot, DeclarationId, Invocation, Statement};

use crate::LinkError;

/// The names given to the slots of the chain of a declaration.
#[derive(Debug, Clone, Default)]
pub struct SlotNames {
    pub declaration: DeclarationId,
    /// The member holding the original implementation.
    pub base: Option<String>,
    /// The members holding the overrides, by chain index.
    pub entries: BTreeMap<usize, String>,
}

impl SlotNames {
    /// The slots of a declaration that has no chain: only `Nothing` can be resolved.
    pub fn unchained(declaration: DeclarationId) -> SlotNames {
        SlotNames {
            declaration,
            ..Default::default()
        }
    }

    fn name_of(&self, slot: ChainSlot) -> Option<&str> {
        match slot {
            ChainSlot::Nothing => None,
            ChainSlot::Base => self.base.as_deref(),
            ChainSlot::Entry(index) => self.entries.get(&index).map(|s| s.as_str()),
        }
    }
}

/// Replace every proceed reference of the body with a call to the member of its slot. Proceeds
/// to [`ChainSlot::Nothing`] are dropped.
pub fn resolve_body(body: Body, names: &SlotNames) -> Result<Body, LinkError> {
    let mut resolved = Body::new();
    for statement in body.statements {
        let statement = match statement {
            Statement::Proceed(proceed) => {
                let unresolved = || LinkError::UnresolvedProceed {
                    declaration: proceed.declaration,
                    slot: proceed.target,
                };
                if proceed.declaration != names.declaration {
                    return Err(unresolved());
                }
                if proceed.target == ChainSlot::Nothing {
                    continue;
                }
                let member = names.name_of(proceed.target).ok_or_else(unresolved)?;
                Statement::Invoke(Invocation {
                    member: member.to_string(),
                    accessor: proceed.accessor,
                })
            }
            other => other,
        };
        resolved.push(statement);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use weaver_model::{Accessor, ProceedReference};

    use super::*;

    fn proceed(slot: ChainSlot) -> Statement {
        Statement::Proceed(ProceedReference {
            declaration: DeclarationId::default(),
            target: slot,
            accessor: Accessor::Get,
        })
    }

    #[test]
    fn test_resolve() {
        let mut names = SlotNames::unchained(DeclarationId::default());
        names.base = Some("Count_Source".into());
        names.entries.insert(0, "Count_Log".into());
        let body = Body {
            statements: vec![
                proceed(ChainSlot::Nothing),
                proceed(ChainSlot::Base),
                Statement::Emit("x".into()),
                proceed(ChainSlot::Entry(0)),
            ],
        };
        let resolved = resolve_body(body, &names).unwrap();
        assert_eq!(
            resolved.statements,
            vec![
                Statement::Invoke(Invocation {
                    member: "Count_Source".into(),
                    accessor: Accessor::Get
                }),
                Statement::Emit("x".into()),
                Statement::Invoke(Invocation {
                    member: "Count_Log".into(),
                    accessor: Accessor::Get
                }),
            ]
        );
    }

    #[test]
    fn test_unresolved() {
        let names = SlotNames::unchained(DeclarationId::default());
        let body = Body {
            statements: vec![proceed(ChainSlot::Entry(3))],
        };
        assert_eq!(
            resolve_body(body, &names),
            Err(LinkError::UnresolvedProceed {
                declaration: DeclarationId::default(),
                slot: ChainSlot::Entry(3)
            })
        );
    }
}
