//! `npq install` command implementation.

use super::vet::{self, Decision, Options};
use miette::{IntoDiagnostic, Result};
use npq_core::{Config, PackageRequest};
use std::path::Path;
use tracing::info;

/// Vet `packages`, then install them if they pass or the user accepts.
///
/// Returns the process exit code.
pub fn run(config: Config, cwd: &Path, packages: &[String], options: &Options) -> Result<i32> {
    let requests = packages
        .iter()
        .map(|p| PackageRequest::parse(p))
        .collect::<Result<Vec<_>, _>>()
        .into_diagnostic()?;

    let Some(result) = vet::vet(config, &requests, options)? else {
        return Ok(1);
    };

    match vet::decide(result.count_errors(), options, vet::confirm_on_terminal)? {
        Decision::Stop(code) => Ok(code),
        Decision::Install => {
            info!(cwd = %cwd.display(), "installing packages");
            vet::spawn_install(&options.package_manager, cwd, packages)
        }
    }
}
