//! `jspipe compile` command.

use crate::cli::CompileArgs;
use crate::config::PipelineConfig;
use crate::context::ServiceContext;
use crate::stages::collect_files;
use crate::stages::compile::{compile, CompileRequest};

/// Execute the `compile` command with the configured production options,
/// overridden by the command-line level and defines.
///
/// # Errors
///
/// Returns an error string if the options are invalid or compilation fails.
pub fn run(ctx: &ServiceContext, config: &PipelineConfig, args: &CompileArgs) -> Result<(), String> {
    let mut options = config.compile.clone();
    if let Some(level) = &args.compilation_level {
        options.compilation_level = level.parse()?;
    }
    for (key, value) in &args.defines {
        options.defines.insert(key.clone(), value.clone());
    }
    let sources = collect_files(&args.sources).map_err(|e| e.to_string())?;
    compile(
        ctx,
        &CompileRequest {
            sources: &sources,
            entrypoints: &args.entrypoints,
            options: &options,
            destination: &args.destination,
            output_filename: &args.output,
        },
    )
    .map_err(|e| e.to_string())?;
    println!("Compiled {}.", args.destination.join(&args.output).display());
    Ok(())
}
