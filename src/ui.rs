use std::io::Write;

use anyhow::{Context, Error};
use colored::Colorize;
use serde::Serialize;

use crate::weave::WeaveResult;

/// The type of the UI to use, it is used to select which UI to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UIType {
    /// The human readable output: the diagnostics on stderr, the woven code on stdout.
    Print,
    /// A single JSON document on stdout.
    Json,
}

impl std::str::FromStr for UIType {
    type Err = String;

    fn from_str(s: &str) -> Result<UIType, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "print" => Ok(UIType::Print),
            "json" => Ok(UIType::Json),
            _ => Err(format!("Unknown ui: {}", s)),
        }
    }
}

/// The calls of a traced member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceReport {
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    result: &'a WeaveResult,
    traces: &'a [TraceReport],
}

/// Write the result of a weaving with the selected UI.
pub fn print_result<W: Write>(
    out: &mut W,
    ui: UIType,
    result: &WeaveResult,
    traces: &[TraceReport],
) -> Result<(), Error> {
    match ui {
        UIType::Print => print(out, result, traces),
        UIType::Json => {
            serde_json::to_writer_pretty(&mut *out, &JsonReport { result, traces })
                .context("Failed to serialize the result")?;
            writeln!(out)?;
            Ok(())
        }
    }
}

fn print<W: Write>(out: &mut W, result: &WeaveResult, traces: &[TraceReport]) -> Result<(), Error> {
    for diagnostic in result.diagnostics.diagnostics() {
        eprintln!("{}", diagnostic);
    }
    for deferred in &result.deferred_sources {
        eprintln!(
            "{} {} from {}: the aspect is not part of the project",
            "Deferred".bold(),
            deferred.aspect,
            deferred.source
        );
    }
    write!(out, "{}", result.output.render())?;
    for artifact in &result.artifacts {
        writeln!(
            out,
            "\n{} {} ({})",
            "Artifact".bold(),
            artifact.name,
            artifact.layer
        )?;
        writeln!(out, "{}", artifact.content)?;
    }
    for trace in traces {
        match (&trace.markers, &trace.error) {
            (Some(markers), _) => {
                writeln!(out, "\n{} {}", "Trace".bold(), trace.target)?;
                for (i, marker) in markers.iter().enumerate() {
                    writeln!(out, "{:>4}. {}", i + 1, marker)?;
                }
            }
            (None, error) => {
                let error = error.as_deref().unwrap_or("no trace");
                eprintln!("{} {}: {}", "Trace".bold().red(), trace.target, error);
            }
        }
    }
    let errors = result.diagnostics.errors().count();
    let warnings = result.diagnostics.len() - errors;
    eprintln!(
        "{} {} steps, {} types, {} errors, {} warnings",
        "Woven".bold().green(),
        result.executed_steps.len(),
        result.output.types.len(),
        errors,
        warnings
    );
    Ok(())
}
