//! Helper-script execution.
//!
//! Scripts are written to disk by the caller and run through the shell that
//! suits the host. Script variables reach the child as environment variables
//! and are never placed on the command line, so sensitive values cannot leak
//! into logged invocations.

use crate::command_line::{CommandLine, CommandLineInvocation};
use crate::error::Result;
use crate::process::{CommandRunner, ProcessOptions, ProcessResult};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::fmt;

/// Script dialects the engine can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSyntax {
    /// POSIX shell, run with `bash`.
    Bash,
    /// PowerShell, run with `pwsh`.
    PowerShell,
}

impl ScriptSyntax {
    /// The dialect native to the current platform.
    #[must_use]
    pub const fn preferred_for_environment() -> Self {
        if cfg!(windows) { Self::PowerShell } else { Self::Bash }
    }

    /// File extension for scripts in this dialect, including the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Bash => ".sh",
            Self::PowerShell => ".ps1",
        }
    }
}

/// A script file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    path: Utf8PathBuf,
    syntax: ScriptSyntax,
}

impl Script {
    /// Refer to the script at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, syntax: ScriptSyntax) -> Self {
        Self {
            path: path.into(),
            syntax,
        }
    }

    /// Location of the script.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Dialect of the script.
    #[must_use]
    pub const fn syntax(&self) -> ScriptSyntax {
        self.syntax
    }
}

#[derive(Clone, PartialEq, Eq)]
struct Variable {
    value: String,
    sensitive: bool,
}

/// Named values made available to a script.
///
/// Values marked sensitive are masked in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Variables {
    entries: BTreeMap<String, Variable>,
}

impl Variables {
    /// An empty variable set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.insert(name.into(), value.into(), false);
    }

    /// Set a variable whose value must never be displayed.
    pub fn set_sensitive(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.insert(name.into(), value.into(), true);
    }

    fn insert(&mut self, name: String, value: String, sensitive: bool) {
        self.entries.insert(name, Variable { value, sensitive });
    }

    /// Value of a variable, if set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|v| v.value.as_str())
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, v)| (name.as_str(), v.value.as_str()))
    }
}

impl fmt::Debug for Variables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, v)| {
                let shown = if v.sensitive { "*****" } else { v.value.as_str() };
                (name, shown)
            }))
            .finish()
    }
}

/// Runs helper scripts.
#[cfg_attr(test, mockall::automock)]
pub trait ScriptEngine {
    /// Run `script` with `variables` layered over `options.env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the interpreter cannot be started. A non-zero exit
    /// is reported through the returned [`ProcessResult`].
    fn execute(
        &self,
        script: &Script,
        variables: &Variables,
        options: &ProcessOptions,
    ) -> Result<ProcessResult>;
}

/// Runs scripts through `bash` or `pwsh` using a [`CommandRunner`].
#[derive(Clone, Copy)]
pub struct ShellScriptEngine<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> ShellScriptEngine<'a> {
    /// Create an engine that starts interpreters through `runner`.
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }
}

impl fmt::Debug for ShellScriptEngine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellScriptEngine").finish_non_exhaustive()
    }
}

/// Interpreter command line for `script`.
///
/// # Errors
///
/// Propagates command-line construction errors.
pub fn interpreter_command(script: &Script) -> Result<CommandLineInvocation> {
    match script.syntax() {
        ScriptSyntax::Bash => CommandLine::new("bash").positional(script.path()).build(),
        ScriptSyntax::PowerShell => CommandLine::new("pwsh")
            .flag("NoLogo")
            .flag("NonInteractive")
            .flag("NoProfile")
            .argument("ExecutionPolicy", "Bypass")
            .argument("File", script.path())
            .build(),
    }
}

impl ScriptEngine for ShellScriptEngine<'_> {
    fn execute(
        &self,
        script: &Script,
        variables: &Variables,
        options: &ProcessOptions,
    ) -> Result<ProcessResult> {
        let invocation = interpreter_command(script)?;
        let mut options = options.clone();
        options
            .env
            .extend(variables.iter().map(|(k, v)| (k.to_owned(), v.to_owned())));
        log::debug!("running script {} with variables {variables:?}", script.path());
        self.runner.run(&invocation, &options)
    }
}
