//! `jspipe transpile` command.

use crate::cli::TranspileArgs;
use crate::context::ServiceContext;
use crate::stages::transpile::{run_incremental, TranspileRequest};
use crate::store::StateStore;

/// Execute the `transpile` command.
///
/// # Errors
///
/// Returns an error string if the transpiler fails.
pub fn run(ctx: &ServiceContext, store: &StateStore, args: &TranspileArgs) -> Result<(), String> {
    let request = TranspileRequest {
        sources: args.sources.clone(),
        native_js_sources: args.native_js_sources.clone(),
        classpath: args.classpath.clone(),
        destination: args.destination.clone(),
    };
    match run_incremental(ctx, store, &request).map_err(|e| e.to_string())? {
        Some(count) => println!("Transpiled {count} source file(s)."),
        None => println!("Transpile output is up to date."),
    }
    Ok(())
}
