//! Shared vet-then-decide flow behind `install` and `check`.

use crate::render::{self, Summary};
use miette::{IntoDiagnostic, Result};
use npq_core::{Config, PackageReport, PackageRequest, Pipeline, PipelineResult};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Environment variable naming the package manager to hand off to.
pub const PKG_MGR_ENV: &str = "NPQ_PKG_MGR";

const CONFIRM_MESSAGE: &str = "Would you like to continue installing package(s)?";

/// Output flags shared by every vetting command.
#[derive(Debug, Clone)]
pub struct Options {
    pub json: bool,
    pub plain: bool,
    pub dry_run: bool,
    pub package_manager: String,
}

/// Vet result for JSON output.
#[derive(Serialize)]
struct VetOutput<'a> {
    ok: bool,
    summary: Summary,
    #[serde(skip_serializing_if = "Option::is_none")]
    reports: Option<Vec<PackageReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<&'a PipelineResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// What to do once the report is out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Hand the packages to the package manager.
    Install,
    /// Stop without installing; carries the exit code.
    Stop(i32),
}

/// Run the pipeline and print the report.
///
/// Returns `None` when the run failed and the failure was already printed
/// as JSON.
pub fn vet(config: Config, requests: &[PackageRequest], options: &Options) -> Result<Option<PipelineResult>> {
    let pipeline = Pipeline::new(config).into_diagnostic()?;
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;

    info!(packages = requests.len(), "vetting packages");
    let result = match runtime.block_on(pipeline.process(requests)) {
        Ok(result) => result,
        Err(err) if options.json => {
            print_json(&VetOutput {
                ok: false,
                summary: Summary::default(),
                reports: None,
                results: None,
                error: Some(err.to_string()),
            })?;
            return Ok(None);
        }
        Err(err) => return Err(err).into_diagnostic(),
    };

    let summary = Summary::of(&result);
    if options.json {
        print_json(&VetOutput {
            ok: summary.errors == 0,
            summary,
            reports: Some(result.aggregate()),
            results: Some(&result),
            error: None,
        })?;
    } else {
        let mut out = io::stdout().lock();
        render::report(&mut out, &result, !options.plain).into_diagnostic()?;
        render::summary(&mut out, &summary).into_diagnostic()?;
    }

    Ok(Some(result))
}

/// Decide whether to install after a report with `errors` errors.
///
/// Errors need explicit confirmation. Dry runs and JSON output never
/// install.
pub fn decide<F>(errors: usize, options: &Options, confirm: F) -> Result<Decision>
where
    F: FnOnce() -> io::Result<bool>,
{
    let failing = i32::from(errors > 0);
    if options.dry_run || options.json {
        return Ok(Decision::Stop(failing));
    }
    if errors == 0 {
        return Ok(Decision::Install);
    }
    if confirm().into_diagnostic()? {
        Ok(Decision::Install)
    } else {
        Ok(Decision::Stop(failing))
    }
}

/// Ask a yes/no question, defaulting to no. Re-asks on anything else.
pub fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W, message: &str) -> io::Result<bool> {
    loop {
        write!(output, "{message} (y/N) ")?;
        output.flush()?;

        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            writeln!(output)?;
            return Ok(false);
        }

        match answer.trim().to_lowercase().as_str() {
            "" | "n" | "no" => return Ok(false),
            "y" | "yes" => return Ok(true),
            _ => writeln!(output, "Please answer with y/yes or n/no.")?,
        }
    }
}

/// Ask on the terminal whether to continue.
pub fn confirm_on_terminal() -> io::Result<bool> {
    let stdin = io::stdin();
    let mut out = io::stdout().lock();
    writeln!(out)?;
    prompt(&mut stdin.lock(), &mut out, CONFIRM_MESSAGE)
}

/// Run `<package_manager> install <packages...>` in `cwd` and return its
/// exit code.
pub fn spawn_install(package_manager: &str, cwd: &Path, packages: &[String]) -> Result<i32> {
    debug!(package_manager, cwd = %cwd.display(), ?packages, "handing off to package manager");
    let status = Command::new(package_manager)
        .current_dir(cwd)
        .arg("install")
        .args(packages)
        .status()
        .into_diagnostic()?;
    Ok(status.code().unwrap_or(1))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
