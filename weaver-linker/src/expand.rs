use std::collections::BTreeMap;

use regex::{Captures, Regex};

use weaver_model::{
    Accessor, AspectLayerId, Body, ChainSlot, Declaration, DeclarationId, ProceedReference,
    Statement, Template, TemplateLine,
};

use crate::ExpansionError;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid placeholder regex");
}

/// Supplies the proceed references of a chain entry. It's the only place where the wiring of the
/// chain enters the expanded bodies.
pub trait ProceedProvider {
    /// The reference to the previous implementation of `accessor`.
    fn proceed(&self, accessor: Accessor) -> ProceedReference;
}

/// Proceeds to a fixed slot of the chain of a declaration.
#[derive(Debug, Clone, Copy)]
pub struct SlotProceed {
    pub declaration: DeclarationId,
    pub slot: ChainSlot,
}

impl ProceedProvider for SlotProceed {
    fn proceed(&self, accessor: Accessor) -> ProceedReference {
        ProceedReference {
            declaration: self.declaration,
            target: self.slot,
            accessor,
        }
    }
}

/// What a template is expanded for.
#[derive(Debug, Clone, Copy)]
pub struct ExpansionContext<'a> {
    /// The declaration the template is applied to.
    pub declaration: &'a Declaration,
    pub accessor: Accessor,
    /// The arguments of the advice that produced the template.
    pub arguments: &'a BTreeMap<String, String>,
    /// The layer that produced the template.
    pub layer: &'a AspectLayerId,
}

impl<'a> ExpansionContext<'a> {
    /// The value of a placeholder. `member`, `layer` and `accessor` are always available, the
    /// other names are looked up in the arguments.
    pub fn lookup(&self, name: &str) -> Option<String> {
        if let Some(value) = self.arguments.get(name) {
            return Some(value.clone());
        }
        match name {
            "member" => Some(self.declaration.name.clone()),
            "layer" => Some(self.layer.to_string()),
            "accessor" => Some(self.accessor.to_string()),
            _ => None,
        }
    }
}

/// Turns an abstract [`Template`] into a concrete [`Body`].
pub trait TemplateExpander: Send + Sync {
    fn expand(
        &self,
        template: &Template,
        context: &ExpansionContext,
        proceed: &dyn ProceedProvider,
    ) -> Result<Body, ExpansionError>;
}

/// The default expander of line templates: `proceed` lines become proceed references and the
/// `{name}` placeholders are substituted.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExpander;

impl DefaultExpander {
    fn substitute(
        template: &Template,
        text: &str,
        context: &ExpansionContext,
    ) -> Result<String, ExpansionError> {
        let mut missing = None;
        let result = PLACEHOLDER.replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            match context.lookup(name) {
                Some(value) => value,
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            }
        });
        match missing {
            Some(name) => Err(ExpansionError::MissingArgument {
                template: template.name.clone(),
                name,
            }),
            None => Ok(result.into_owned()),
        }
    }
}

impl TemplateExpander for DefaultExpander {
    fn expand(
        &self,
        template: &Template,
        context: &ExpansionContext,
        proceed: &dyn ProceedProvider,
    ) -> Result<Body, ExpansionError> {
        let mut body = Body::new();
        for line in &template.lines {
            let statement = match line {
                TemplateLine::Proceed => Statement::Proceed(proceed.proceed(context.accessor)),
                TemplateLine::Emit(marker) => {
                    Statement::Emit(Self::substitute(template, marker, context)?)
                }
                TemplateLine::Text(text) => {
                    Statement::Text(Self::substitute(template, text, context)?)
                }
            };
            body.push(statement);
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use weaver_model::DeclarationKind;

    use super::*;

    fn expand(template: &Template, arguments: &BTreeMap<String, String>) -> Result<Body, ExpansionError> {
        let declaration = Declaration::new("Foo", DeclarationKind::Method);
        let layer = AspectLayerId::new("Log", Some("late"));
        let context = ExpansionContext {
            declaration: &declaration,
            accessor: Accessor::Invoke,
            arguments,
            layer: &layer,
        };
        let proceed = SlotProceed {
            declaration: declaration.id,
            slot: ChainSlot::Base,
        };
        DefaultExpander.expand(template, &context, &proceed)
    }

    #[test]
    fn test_expand_placeholders() {
        let template = Template::parse(
            "log",
            ["emit {prefix}:{member}", "proceed", "log(\"{layer}\");", "if (x) { y(); }"],
        );
        let mut arguments = BTreeMap::new();
        arguments.insert("prefix".to_string(), "enter".to_string());
        let body = expand(&template, &arguments).unwrap();
        assert_eq!(
            body.statements,
            vec![
                Statement::Emit("enter:Foo".into()),
                Statement::Proceed(ProceedReference {
                    declaration: DeclarationId::default(),
                    target: ChainSlot::Base,
                    accessor: Accessor::Invoke,
                }),
                Statement::Text("log(\"Log:late\");".into()),
                Statement::Text("if (x) { y(); }".into()),
            ]
        );
    }

    #[test]
    fn test_missing_argument() {
        let template = Template::parse("log", ["emit {nope}"]);
        assert_eq!(
            expand(&template, &BTreeMap::new()),
            Err(ExpansionError::MissingArgument {
                template: "log".into(),
                name: "nope".into()
            })
        );
    }

    #[test]
    fn test_arguments_shadow_builtins() {
        let template = Template::parse("log", ["emit {member}"]);
        let mut arguments = BTreeMap::new();
        arguments.insert("member".to_string(), "Other".to_string());
        let body = expand(&template, &arguments).unwrap();
        assert_eq!(body.statements, vec![Statement::Emit("Other".into())]);
    }
}
