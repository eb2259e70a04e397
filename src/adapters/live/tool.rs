//! Live tool runner using `std::process::Command`.

use std::process::{Command, Stdio};

use crate::ports::tool::{ToolInvocation, ToolOutput, ToolRunner};

/// Live tool runner that starts a fresh process per invocation, so no
/// tool state survives from one invocation to the next.
#[derive(Debug, Default)]
pub struct LiveToolRunner;

impl ToolRunner for LiveToolRunner {
    fn invoke(
        &self,
        invocation: &ToolInvocation,
    ) -> Result<ToolOutput, Box<dyn std::error::Error + Send + Sync>> {
        let (program, leading) = invocation
            .command
            .split_first()
            .ok_or("tool command is empty")?;
        let mut command = Command::new(program);
        command.args(leading).args(&invocation.args).stdin(Stdio::null());
        let output = command
            .output()
            .map_err(|e| format!("failed to run {program}: {e}"))?;
        Ok(ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
