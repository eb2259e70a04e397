//! `jspipe strip` command.

use crate::cli::StripArgs;
use crate::context::ServiceContext;
use crate::stages::strip::{run_incremental, StripMode};
use crate::store::StateStore;

/// Execute the `strip` command.
///
/// # Errors
///
/// Returns an error string if stripping fails.
pub fn run(ctx: &ServiceContext, store: &StateStore, args: &StripArgs) -> Result<(), String> {
    let mode = if args.batch { StripMode::Batch } else { StripMode::PerFile };
    let report = run_incremental(ctx, store, &args.sources, &args.destination, mode)
        .map_err(|e| e.to_string())?;
    println!(
        "Stripped {} file(s), removed {} output(s).",
        report.written.len(),
        report.deleted.len()
    );
    if !report.unmapped.is_empty() {
        println!("{} output(s) kept under their archive path.", report.unmapped.len());
    }
    Ok(())
}
