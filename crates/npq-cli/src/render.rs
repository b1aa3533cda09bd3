//! Human-readable report rendering.

use npq_core::{Category, Finding, PipelineResult};
use serde::Serialize;
use std::io::{self, Write};

const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Totals printed under the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub packages: usize,
    pub errors: usize,
    pub warnings: usize,
}

impl Summary {
    #[must_use]
    pub fn of(result: &PipelineResult) -> Self {
        Self {
            packages: result.len(),
            errors: result.count_errors(),
            warnings: result.count_warnings(),
        }
    }
}

/// Width of the longest category title, for alignment.
fn label_width() -> usize {
    Category::ALL.iter().map(|c| c.title().len()).max().unwrap_or(0)
}

/// One block per package with findings.
pub fn report<W: Write>(out: &mut W, result: &PipelineResult, color: bool) -> io::Result<()> {
    let paint = |code: &'static str| if color { code } else { "" };
    let reset = paint(RESET);

    let mut first = true;
    for pkg in result.aggregate() {
        if pkg.errors.is_empty() && pkg.warnings.is_empty() {
            continue;
        }
        if !first {
            writeln!(out)?;
        }
        first = false;

        writeln!(out, "Package: {}{}{reset}", paint(BOLD), pkg.package)?;
        for finding in &pkg.errors {
            line(out, "ERROR:  ", paint(RED), reset, finding)?;
        }
        for finding in &pkg.warnings {
            line(out, "WARNING:", paint(YELLOW), reset, finding)?;
        }
    }
    Ok(())
}

fn line<W: Write>(out: &mut W, tag: &str, color: &str, reset: &str, finding: &Finding) -> io::Result<()> {
    writeln!(
        out,
        " {color}{tag} {:<width$}{reset} {}",
        finding.category.title(),
        finding.message,
        width = label_width()
    )
}

pub fn summary<W: Write>(out: &mut W, summary: &Summary) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Summary:")?;
    writeln!(out, " - Total packages: {}", summary.packages)?;
    writeln!(out, " - Total errors:   {}", summary.errors)?;
    writeln!(out, " - Total warnings: {}", summary.warnings)?;
    Ok(())
}
