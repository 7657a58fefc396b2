//! Console rendering of case reports.

use std::fmt::Write;
use std::time::Duration;

use planspec_core::harness::CaseReport;
use planspec_core::plan::Plan;
use planspec_core::render::to_block;
use planspec_core::{Diagnostic, Severity, Value};

/// Renders one case: its header, the plan if asked for, then one line per
/// diagnostic.
pub fn render_case(report: &CaseReport, display_plan: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "🏷  {}", report.name);
    if display_plan {
        if let Some(plan) = &report.plan {
            out.push_str(&render_plan(plan));
        }
    }
    for diag in &report.diagnostics {
        out.push_str(&render_diagnostic(diag));
        out.push('\n');
    }
    out
}

pub fn render_diagnostic(diag: &Diagnostic) -> String {
    let mark = match diag.severity {
        Severity::Info => " ✔  ",
        Severity::Error => " ❌  ",
    };
    format!("{}{}", mark, diag)
}

/// Renders the planned changes as HCL blocks.
pub fn render_plan(plan: &Plan) -> String {
    let mut out = String::new();
    for change in &plan.resources {
        out.push_str(&to_block(
            "resource",
            &[change.resource_type(), change.name()],
            &change.after,
        ));
    }
    for output in &plan.outputs {
        let value = output.after.elements().first().cloned().unwrap_or_default();
        out.push_str(&to_block(
            "output",
            &[output.name.as_str()],
            &Value::object([("value", value)]),
        ));
    }
    out
}

/// Final line of a run.
pub fn summary(total: usize, errors: usize, elapsed: Duration) -> String {
    format!(
        "\n🏁 {} suites run in {:?} \terror : {} \tsuccess : {}",
        total,
        elapsed,
        errors,
        total - errors
    )
}
