//! Tool runner port for invoking external, versioned build tools.

/// A single invocation of an external tool.
///
/// `command` holds the program followed by any leading arguments taken from
/// configuration (e.g. `java -jar compiler.jar`); `args` are the
/// stage-computed arguments appended after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Program and its configured leading arguments.
    pub command: Vec<String>,
    /// Arguments computed by the stage.
    pub args: Vec<String>,
}

impl ToolInvocation {
    /// Creates an invocation of `command` with the given arguments.
    #[must_use]
    pub fn new(command: &[String], args: Vec<String>) -> Self {
        Self { command: command.to_vec(), args }
    }

    /// Renders the full command line for logging.
    #[must_use]
    pub fn display(&self) -> String {
        self.command.iter().chain(&self.args).map(String::as_str).collect::<Vec<_>>().join(" ")
    }
}

/// The output of a tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// The exit code reported by the tool.
    pub exit_code: i32,
    /// The captured standard output.
    pub stdout: String,
    /// The captured standard error.
    pub stderr: String,
}

/// Runs external tools as isolated units of work.
///
/// Every call must start from a clean slate: no state from one invocation
/// may be observable by the next.
pub trait ToolRunner: Send + Sync {
    /// Invokes the tool and waits for it to finish.
    ///
    /// A non-zero exit code is reported through [`ToolOutput::exit_code`],
    /// not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool cannot be launched at all.
    fn invoke(
        &self,
        invocation: &ToolInvocation,
    ) -> Result<ToolOutput, Box<dyn std::error::Error + Send + Sync>>;
}
