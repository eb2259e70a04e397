//! Command dispatch and handlers.

pub mod compile;
pub mod strip;
pub mod transpile;

use crate::cli::{Cli, Command};
use crate::config::PipelineConfig;
use crate::context::ServiceContext;
use crate::store::StateStore;

/// Dispatch a parsed command line to its handler with live adapters.
///
/// # Errors
///
/// Returns an error string if configuration loading or the selected command
/// handler fails.
pub fn dispatch(cli: &Cli) -> Result<(), String> {
    let config = PipelineConfig::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    config.validate().map_err(|e| e.to_string())?;
    let ctx = ServiceContext::live(&config);
    dispatch_with_context(&cli.command, &ctx, &config)
}

/// Dispatch a command with the given service context.
///
/// # Errors
///
/// Returns the failing handler's error message.
pub fn dispatch_with_context(
    command: &Command,
    ctx: &ServiceContext,
    config: &PipelineConfig,
) -> Result<(), String> {
    let store = StateStore::new(&config.state_dir);
    match command {
        Command::Strip(args) => strip::run(ctx, &store, args),
        Command::Transpile(args) => transpile::run(ctx, &store, args),
        Command::Compile(args) => compile::run(ctx, config, args),
        Command::GenerateTests(args) => generate_tests::run(ctx, args),
        Command::CompileTests(args) => compile_tests::run(ctx, config, args),
        Command::Test(args) => test::run(ctx, config, args),
    }
}
