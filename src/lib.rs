//! Core library entry for the `jspipe` CLI.
//!
//! A build pipeline turning Java sources into browser JavaScript through
//! external tools (stripper, transpiler, Closure compiler, test adapter
//! generator) and running the resulting test bundles in headless browsers.

pub mod adapters;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod harness;
pub mod incremental;
pub mod paths;
pub mod ports;
pub mod stages;
pub mod store;
pub mod summary;

use clap::Parser;

/// Run the CLI with the provided arguments.
///
/// # Errors
///
/// Returns an error string when argument parsing fails or command execution fails.
pub fn run<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Cli::try_parse_from(args).map_err(|err| err.to_string())?;
    commands::dispatch(&cli)
}

#[cfg(test)]
mod tests {
    use super::run;

    #[test]
    fn run_errors_on_unknown_subcommand() {
        let result = run(["jspipe", "unknown"]);
        assert!(result.is_err());
    }

    #[test]
    fn run_errors_on_missing_required_flags() {
        let err = run(["jspipe", "strip"]).unwrap_err();
        assert!(err.contains("--source"));
    }
}
