//! Diagnostics produced while weaving.
//!
//! Nothing local to one declaration or one pipeline step aborts a weaving run: problems are
//! collected as [`Diagnostic`]s inside a [`DiagnosticContext`] and handed back together with the
//! final result, so that a single run can report many independent problems.

use std::fmt::{Display, Formatter};

use colored::{Color, Colorize};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Warning,
    Error,
}

impl DiagnosticLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticLevel::Error => "Error",
            DiagnosticLevel::Warning => "Warning",
        }
    }

    pub fn color(&self) -> Color {
        match self {
            DiagnosticLevel::Warning => Color::BrightYellow,
            DiagnosticLevel::Error => Color::BrightRed,
        }
    }
}

impl Display for DiagnosticLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single problem found while scheduling or linking.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    level: DiagnosticLevel,
    message: String,
    /// The aspect layer that caused the problem, if known.
    origin: Option<String>,
    /// Path of the declaration the problem is about, if any.
    location: Option<String>,
    note: Option<String>,
    help: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warning, message)
    }

    fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            origin: None,
            location: None,
            note: None,
            help: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn print(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let level = self.level.as_str();
        let pad = level.len();
        writeln!(
            f,
            "{}: {}",
            level.color(self.level.color()).bold(),
            self.message
        )?;
        if let Some(location) = &self.location {
            writeln!(f, "{:>pad$} {}", "-->".bold(), location, pad = pad)?;
        }
        if let Some(origin) = &self.origin {
            writeln!(f, "{:>pad$}: {}", "From".bold(), origin, pad = pad)?;
        }
        if let Some(note) = &self.note {
            write!(f, "{:>pad$}: ", "Note".bold(), pad = pad)?;
            let mut lines = note.lines();
            if let Some(line) = lines.next() {
                writeln!(f, "{}", line)?;
            }
            for line in lines {
                writeln!(f, "{:>pad$}  {}", "", line, pad = pad)?;
            }
        }
        if let Some(help) = &self.help {
            writeln!(f, "{:>pad$}: {}", "Help".bold(), help, pad = pad)?;
        }
        Ok(())
    }

    pub fn level(&self) -> DiagnosticLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.print(f)
    }
}

/// Ordered collection of the diagnostics of a run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct DiagnosticContext {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Move all the diagnostics of `other` at the end of this context, keeping their order.
    pub fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, other: I) {
        self.diagnostics.extend(other);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }
}

impl IntoIterator for DiagnosticContext {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_print_full_diagnostic() {
        colored::control::set_override(false);
        let diagnostic = Diagnostic::error("Cannot link Foo")
            .with_location("App.Service.Foo")
            .with_origin("Logging")
            .with_note("first line\nsecond line")
            .with_help("remove the aspect");
        assert_eq!(
            diagnostic.to_string(),
            "Error: Cannot link Foo\n  --> App.Service.Foo\n From: Logging\n Note: first line\n       second line\n Help: remove the aspect\n"
        );
    }

    #[test]
    fn test_context_errors() {
        let mut context = DiagnosticContext::new();
        assert!(!context.has_errors());
        context.add_diagnostic(Diagnostic::warning("meh"));
        assert!(!context.has_errors());
        context.extend(vec![Diagnostic::error("bad"), Diagnostic::warning("meh 2")]);
        assert!(context.has_errors());
        assert_eq!(context.len(), 3);
        assert_eq!(context.errors().count(), 1);
        let messages: Vec<_> = context.diagnostics().iter().map(|d| d.message()).collect();
        assert_eq!(messages, vec!["meh", "bad", "meh 2"]);
    }
}
