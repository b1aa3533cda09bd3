#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;
mod render;

use clap::Parser;
use commands::vet::{Options, PKG_MGR_ENV};
use miette::Result;
use npq_core::Config;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "npq")]
#[command(author, version, about = "Vet npm packages before installing them", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print the report as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    /// Disable colors in the report
    #[arg(long, global = true)]
    plain: bool,

    /// Only report; never hand off to the package manager
    #[arg(long, global = true)]
    dry_run: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Package manager to run once packages are accepted
    #[arg(long, global = true, env = PKG_MGR_ENV, default_value = "npm")]
    package_manager: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Vet packages, then install them
    #[command(visible_aliases = ["i", "add"])]
    Install {
        /// Packages to install, as `name` or `name@spec`
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Vet the dependencies declared in package.json
    Check {
        /// Include devDependencies
        #[arg(long)]
        dev: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::from_env()
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json_logs);

    logging::init(config.verbosity, config.json_logs);

    let options = Options {
        json: cli.json,
        plain: cli.plain,
        dry_run: cli.dry_run,
        package_manager: cli.package_manager,
    };

    let code = match cli.command {
        Some(Commands::Version) | None => {
            commands::version::run();
            0
        }
        Some(Commands::Install { packages }) => {
            commands::install::run(config, &cwd, &packages, &options)?
        }
        Some(Commands::Check { dev }) => commands::check::run(config, &cwd, dev, &options)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
