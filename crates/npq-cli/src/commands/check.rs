//! `npq check` command implementation.

use super::vet::{self, Options};
use miette::{IntoDiagnostic, Result};
use npq_core::{Config, PackageRequest};
use std::path::Path;

/// Vet the dependencies of `<cwd>/package.json` without installing.
///
/// Returns 1 when any dependency has errors.
pub fn run(config: Config, cwd: &Path, include_dev: bool, options: &Options) -> Result<i32> {
    let requests =
        PackageRequest::from_manifest(&cwd.join("package.json"), include_dev).into_diagnostic()?;

    let Some(result) = vet::vet(config, &requests, options)? else {
        return Ok(1);
    };
    Ok(i32::from(result.count_errors() > 0))
}
