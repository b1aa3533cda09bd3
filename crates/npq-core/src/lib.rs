#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod check;
pub mod checks;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod pkg;
pub mod report;
pub mod throttle;
pub mod version;

pub use check::{
    Category, Check, CheckFailure, CheckRef, CheckRegistry, CheckRunResult, Finding, Severity,
    SharedDeps, ThrottlePolicy,
};
pub use config::Config;
pub use error::Error;
pub use pipeline::Pipeline;
pub use pkg::{PackageMetadata, PackageRequest, PkgError};
pub use report::{PackageReport, PipelineResult, NOT_FOUND_CHECK};
pub use throttle::Throttle;
pub use version::VERSION;
