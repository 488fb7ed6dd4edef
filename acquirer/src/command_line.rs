//! Typed command-line construction with deterministic serialisation.
//!
//! A [`CommandLine`] collects arguments in insertion order and renders them
//! either as shell-escaped tokens (for display and script contexts) or as an
//! unescaped argument vector handed straight to the operating system. The
//! action verb, when set, is always rendered first.
//!
//! # Examples
//!
//! ```
//! use stevedore_acquirer::command_line::CommandLine;
//!
//! let invocation = CommandLine::new("helm")
//!     .action("pull")
//!     .argument("-version", "1.2.3")
//!     .positional("feed/nginx")
//!     .build()?;
//!
//! assert_eq!(invocation.executable(), "helm");
//! assert_eq!(invocation.arguments(), ["pull", "--version", "1.2.3", "feed/nginx"]);
//! # Ok::<(), stevedore_acquirer::error::AcquireError>(())
//! ```

use crate::error::{AcquireError, Result};
use std::fmt;
use std::sync::Arc;

/// Rendering used in place of secret values.
const MASK: &str = "*****";

/// A function invoked in-process with the raw argument tokens.
pub type Callable = Arc<dyn Fn(&[String]) -> i32 + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    Positional(String),
    Named {
        name: String,
        value: String,
        secret: bool,
    },
    Flag(String),
    Raw(String),
}

/// How a value is rendered into a token.
#[derive(Clone, Copy)]
struct Render<'a> {
    escape: bool,
    mask_secrets: bool,
    empty_placeholder: Option<&'a str>,
}

impl Arg {
    fn build(&self, render: Render<'_>) -> String {
        match self {
            Self::Flag(name) => format!("-{}", name.trim()),
            Self::Raw(token) => token.trim().to_owned(),
            Self::Positional(value) => render_value(value, false, render),
            Self::Named {
                name,
                value,
                secret,
            } => {
                let rendered = render_value(value, *secret, render);
                if name.trim().is_empty() {
                    rendered
                } else {
                    format!("-{} {rendered}", name.trim())
                }
            }
        }
    }

    fn raw_tokens(&self) -> Vec<String> {
        match self {
            Self::Named { name, value, .. } if !name.trim().is_empty() => {
                vec![format!("-{}", name.trim()), value.clone()]
            }
            other => vec![other.build(Render {
                escape: false,
                mask_secrets: false,
                empty_placeholder: None,
            })],
        }
    }
}

fn render_value(value: &str, secret: bool, render: Render<'_>) -> String {
    let value = if secret && render.mask_secrets {
        MASK
    } else {
        value
    };
    if !render.escape {
        return value.to_owned();
    }
    match render.empty_placeholder {
        Some(placeholder) if value.is_empty() => escape_argument(placeholder),
        _ => escape_argument(value),
    }
}

/// Escapes a value for a double-quoted shell context.
///
/// Backslashes are doubled only where they would otherwise escape an
/// embedded double quote or the closing quote. Every double quote is then
/// escaped and the result is always wrapped in double quotes, including
/// for empty and simple values.
///
/// # Examples
///
/// ```
/// use stevedore_acquirer::command_line::escape_argument;
///
/// assert_eq!(escape_argument("plain"), "\"plain\"");
/// assert_eq!(escape_argument(r"C:\dir\"), r#""C:\dir\\""#);
/// assert_eq!(escape_argument(r#"say "hi""#), r#""say \"hi\"""#);
/// assert_eq!(escape_argument(""), "\"\"");
/// ```
#[must_use]
pub fn escape_argument(value: &str) -> String {
    let mut reversed = String::with_capacity(value.len() + 2);
    // End of string counts as a following quote (the closing one).
    let mut quote_follows = true;
    for ch in value.chars().rev() {
        match ch {
            '\\' if quote_follows => reversed.push_str("\\\\"),
            '"' => {
                reversed.push('"');
                quote_follows = true;
            }
            other => {
                reversed.push(other);
                quote_follows = false;
            }
        }
    }
    let unescaped_quotes: String = reversed.chars().rev().collect();
    format!("\"{}\"", unescaped_quotes.replace('"', "\\\""))
}

#[derive(Clone)]
enum Target {
    Executable(String),
    Callable(Callable),
}

/// Builder for an external program or in-process callable invocation.
#[derive(Clone)]
pub struct CommandLine {
    target: Target,
    launcher: Option<String>,
    action: Option<String>,
    args: Vec<Arg>,
    empty_placeholder: Option<String>,
    usage_error: Option<(String, String)>,
}

impl fmt::Debug for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match &self.target {
            Target::Executable(exe) => exe.as_str(),
            Target::Callable(_) => "<callable>",
        };
        f.debug_struct("CommandLine")
            .field("target", &target)
            .field("launcher", &self.launcher)
            .field("action", &self.action)
            .field("args", &self.display_tokens())
            .finish_non_exhaustive()
    }
}

impl CommandLine {
    /// Start a command line for an external executable.
    #[must_use]
    pub fn new(executable: impl Into<String>) -> Self {
        Self::with_target(Target::Executable(executable.into()))
    }

    /// Start a command line whose arguments are handed to an in-process
    /// function rather than a new process.
    #[must_use]
    pub fn with_callable(callable: impl Fn(&[String]) -> i32 + Send + Sync + 'static) -> Self {
        Self::with_target(Target::Callable(Arc::new(callable)))
    }

    fn with_target(target: Target) -> Self {
        Self {
            target,
            launcher: None,
            action: None,
            args: Vec::new(),
            empty_placeholder: None,
            usage_error: None,
        }
    }

    /// Set the action verb, rendered before every other argument.
    ///
    /// An action can be set once. A second call is recorded as a usage error
    /// and reported by every build method.
    #[must_use]
    pub fn action(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        match &self.action {
            Some(existing) => {
                if self.usage_error.is_none() {
                    self.usage_error = Some((existing.clone(), name));
                }
            }
            None => {
                self.args.insert(0, Arg::Raw(name.clone()));
                self.action = Some(name);
            }
        }
        self
    }

    /// Append a positional value.
    #[must_use]
    pub fn positional(mut self, value: impl fmt::Display) -> Self {
        self.args.push(Arg::Positional(value.to_string()));
        self
    }

    /// Append a named argument rendered as `-<name> <value>`.
    #[must_use]
    pub fn argument(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.args.push(Arg::Named {
            name: name.into(),
            value: value.to_string(),
            secret: false,
        });
        self
    }

    /// Append a named argument whose value is masked in display output.
    #[must_use]
    pub fn secret_argument(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.args.push(Arg::Named {
            name: name.into(),
            value: value.to_string(),
            secret: true,
        });
        self
    }

    /// Append a flag rendered as `-<name>`.
    #[must_use]
    pub fn flag(mut self, name: impl Into<String>) -> Self {
        self.args.push(Arg::Flag(name.into()));
        self
    }

    /// Append a literal token that is never escaped or prefixed.
    #[must_use]
    pub fn raw(mut self, token: impl Into<String>) -> Self {
        self.args.push(Arg::Raw(token.into()));
        self
    }

    /// Run the executable through a host launcher; the executable becomes
    /// the launcher's first argument.
    #[must_use]
    pub fn launch_with(mut self, launcher: impl Into<String>) -> Self {
        self.launcher = Some(launcher.into());
        self
    }

    /// Substitute `placeholder` for empty values when escaping.
    ///
    /// Some shells drop an empty quoted argument entirely. This is off by
    /// default; enable it only after confirming the target shell's behaviour.
    #[must_use]
    pub fn empty_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.empty_placeholder = Some(placeholder.into());
        self
    }

    /// Render the ordered argument tokens, optionally shell-escaped.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::ActionAlreadySet`] if the action was set twice.
    pub fn command_line(&self, escape: bool) -> Result<Vec<String>> {
        self.check_usage()?;
        let render = Render {
            escape,
            mask_secrets: false,
            empty_placeholder: self.empty_placeholder.as_deref(),
        };
        Ok(self.args.iter().map(|arg| arg.build(render)).collect())
    }

    /// Render the unescaped argument vector, splitting named arguments into
    /// separate name and value tokens.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::ActionAlreadySet`] if the action was set twice.
    pub fn raw_arguments(&self) -> Result<Vec<String>> {
        self.check_usage()?;
        Ok(self.args.iter().flat_map(|arg| arg.raw_tokens()).collect())
    }

    /// Build an invocation of the external executable.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the action was set twice, or if there is no
    /// executable to run.
    pub fn build(&self) -> Result<CommandLineInvocation> {
        let Target::Executable(executable) = &self.target else {
            return Err(AcquireError::EmptyExecutable);
        };
        let executable = executable.trim();
        if executable.is_empty() {
            return Err(AcquireError::EmptyExecutable);
        }

        let mut arguments = self.raw_arguments()?;
        let mut display = self.display_tokens();
        let program = match &self.launcher {
            Some(launcher) => {
                arguments.insert(0, executable.to_owned());
                display.insert(0, escape_argument(executable));
                launcher.clone()
            }
            None => executable.to_owned(),
        };

        Ok(CommandLineInvocation {
            executable: program,
            arguments,
            display,
        })
    }

    /// Build an in-process call with the unescaped argument tokens.
    ///
    /// # Errors
    ///
    /// Returns a usage error if the action was set twice, or
    /// [`AcquireError::MissingCallable`] if the command line targets a program.
    pub fn build_library_call(&self) -> Result<LibraryCallInvocation> {
        let Target::Callable(callable) = &self.target else {
            return Err(AcquireError::MissingCallable);
        };
        Ok(LibraryCallInvocation {
            callable: Arc::clone(callable),
            arguments: self.raw_arguments()?,
        })
    }

    fn check_usage(&self) -> Result<()> {
        match &self.usage_error {
            Some((existing, requested)) => Err(AcquireError::ActionAlreadySet {
                existing: existing.clone(),
                requested: requested.clone(),
            }),
            None => Ok(()),
        }
    }

    fn display_tokens(&self) -> Vec<String> {
        let render = Render {
            escape: true,
            mask_secrets: true,
            empty_placeholder: self.empty_placeholder.as_deref(),
        };
        self.args.iter().map(|arg| arg.build(render)).collect()
    }
}

/// A fully-built external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLineInvocation {
    executable: String,
    arguments: Vec<String>,
    display: Vec<String>,
}

impl CommandLineInvocation {
    /// The program to start.
    #[must_use]
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// The argument vector passed to the program, unescaped.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }
}

/// Renders the escaped command line with secret values masked.
impl fmt::Display for CommandLineInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.executable)?;
        for token in &self.display {
            write!(f, " {token}")?;
        }
        Ok(())
    }
}

/// An in-process call built from a [`CommandLine`].
#[derive(Clone)]
pub struct LibraryCallInvocation {
    callable: Callable,
    arguments: Vec<String>,
}

impl LibraryCallInvocation {
    /// The unescaped tokens passed to the callable.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Invoke the callable and return its exit code.
    #[must_use]
    pub fn execute(&self) -> i32 {
        (self.callable)(&self.arguments)
    }
}

impl fmt::Debug for LibraryCallInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryCallInvocation")
            .field("arguments", &self.arguments.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "command_line_tests.rs"]
mod tests;
