use std::fmt::Write;

use itertools::Itertools;

use weaver_model::{Accessor, DeclarationKind, Statement};

use crate::{LinkedBody, LinkedMember, LinkedOutput, LinkedType};

const INDENT: &str = "    ";

impl LinkedOutput {
    /// Render all the types as C#-like source text.
    pub fn render(&self) -> String {
        self.types.iter().map(|t| t.render()).join("\n")
    }
}

impl LinkedType {
    /// Render the type as C#-like source text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let keyword = if self.is_value_type { "struct" } else { "class" };
        let _ = writeln!(out, "// {}", self.path);
        let _ = writeln!(
            out,
            "public {} {}{}",
            keyword,
            self.name,
            generics(&self.type_parameters)
        );
        out.push_str("{\n");
        for member in &self.members {
            render_member(&mut out, self, member);
        }
        out.push_str("}\n");
        out
    }
}

fn generics(params: &[String]) -> String {
    if params.is_empty() {
        String::new()
    } else {
        format!("<{}>", params.join(", "))
    }
}

fn parameters(member: &LinkedMember) -> String {
    member
        .signature
        .parameters
        .iter()
        .map(|p| format!("{} {}", p.ty, p.name))
        .join(", ")
}

fn arguments(member: &LinkedMember) -> String {
    member.signature.parameters.iter().map(|p| &p.name).join(", ")
}

fn header(ty: &LinkedType, member: &LinkedMember) -> String {
    let mut modifiers = vec![member.accessibility.as_str()];
    if member.is_new {
        modifiers.push("new");
    }
    let return_type = member.signature.return_type.as_deref().unwrap_or("void");
    let modifiers = modifiers.join(" ");
    match member.kind {
        DeclarationKind::Constructor => format!("{} {}({})", modifiers, ty.name, parameters(member)),
        DeclarationKind::Finalizer => format!("~{}()", ty.name),
        DeclarationKind::Operator => format!(
            "{} static {} {}({})",
            modifiers,
            return_type,
            member.name,
            parameters(member)
        ),
        DeclarationKind::Property => format!("{} {} {}", modifiers, return_type, member.name),
        DeclarationKind::Indexer => {
            format!("{} {} this[{}]", modifiers, return_type, parameters(member))
        }
        DeclarationKind::Event => format!("{} event {} {}", modifiers, return_type, member.name),
        DeclarationKind::Field => format!("{} {} {};", modifiers, return_type, member.name),
        _ => format!(
            "{} {} {}{}({})",
            modifiers,
            return_type,
            member.name,
            generics(&member.type_parameters),
            parameters(member)
        ),
    }
}

fn render_member(out: &mut String, ty: &LinkedType, member: &LinkedMember) {
    let header = header(ty, member);
    let _ = writeln!(out, "{}{}", INDENT, header);
    match member.kind {
        DeclarationKind::Field => {}
        DeclarationKind::Property | DeclarationKind::Indexer | DeclarationKind::Event => {
            let _ = writeln!(out, "{}{{", INDENT);
            for (accessor, body) in &member.accessors {
                match body {
                    LinkedBody::Auto => {
                        let _ = writeln!(out, "{0}{0}{1};", INDENT, accessor);
                    }
                    LinkedBody::Block(body) => {
                        let _ = writeln!(out, "{0}{0}{1}", INDENT, accessor);
                        render_block(out, member, &body.statements, 2);
                    }
                }
            }
            let _ = writeln!(out, "{}}}", INDENT);
        }
        _ => match member.accessors.get(&Accessor::Invoke) {
            Some(LinkedBody::Block(body)) => render_block(out, member, &body.statements, 1),
            _ => {
                let _ = writeln!(out, "{0}{{\n{0}}}", INDENT);
            }
        },
    }
}

fn render_block(out: &mut String, member: &LinkedMember, statements: &[Statement], depth: usize) {
    let indent = INDENT.repeat(depth);
    let _ = writeln!(out, "{}{{", indent);
    for statement in statements {
        let _ = writeln!(out, "{}{}{}", indent, INDENT, render_statement(member, statement));
    }
    let _ = writeln!(out, "{}}}", indent);
}

/// A statement inside `member`. Calls to the other members of the chain forward the parameters
/// of `member`.
fn render_statement(member: &LinkedMember, statement: &Statement) -> String {
    let invocation = match statement {
        Statement::Invoke(invocation) => invocation,
        other => return other.to_string(),
    };
    let args = arguments(member);
    let target = if member.kind == DeclarationKind::Indexer {
        format!("this.{}[{}]", invocation.member, args)
    } else {
        format!("this.{}", invocation.member)
    };
    match invocation.accessor {
        Accessor::Invoke if member.signature.return_type.is_some() => {
            format!("return {}({});", target, args)
        }
        Accessor::Invoke => format!("{}({});", target, args),
        Accessor::Get => format!("return {};", target),
        Accessor::Set => format!("{} = value;", target),
        Accessor::Add => format!("{} += value;", target),
        Accessor::Remove => format!("{} -= value;", target),
    }
}
