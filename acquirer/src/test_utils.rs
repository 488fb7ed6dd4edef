//! Shared test utilities for the acquirer crate.

use crate::command_line::CommandLineInvocation;
use crate::error::{AcquireError, Result};
use crate::process::{CommandRunner, FORCED_EXIT_CODE, ProcessOptions, ProcessResult};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

/// A successful result with the given standard output.
#[must_use]
pub fn success_result(stdout: &str) -> ProcessResult {
    ProcessResult {
        stdout: stdout.to_owned(),
        ..ProcessResult::default()
    }
}

/// A failed result with exit code 1 and the given standard error.
#[must_use]
pub fn failure_result(stderr: &str) -> ProcessResult {
    ProcessResult {
        exit_code: 1,
        stderr: stderr.to_owned(),
        ..ProcessResult::default()
    }
}

/// A result describing a process killed after the hang timeout.
#[must_use]
pub fn hung_result() -> ProcessResult {
    ProcessResult {
        exit_code: FORCED_EXIT_CODE,
        forced_termination: true,
        ..ProcessResult::default()
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The program to run (e.g., "helm").
    pub cmd: &'static str,
    /// The exact argument vector; `None` accepts any arguments.
    pub args: Option<Vec<String>>,
    /// The result to return when this command is invoked.
    pub result: Result<ProcessResult>,
}

impl ExpectedCall {
    /// Expect `cmd` with `args`, answering with `result`.
    #[must_use]
    pub fn new(cmd: &'static str, args: &[&str], result: ProcessResult) -> Self {
        Self {
            cmd,
            args: Some(args.iter().map(|arg| (*arg).to_owned()).collect()),
            result: Ok(result),
        }
    }

    /// Expect `cmd` with any arguments, answering with `result`.
    #[must_use]
    pub fn any_args(cmd: &'static str, result: ProcessResult) -> Self {
        Self {
            cmd,
            args: None,
            result: Ok(result),
        }
    }

    /// Expect `cmd` with `args`, failing with `err`.
    #[must_use]
    pub fn failing(cmd: &'static str, args: &[&str], err: AcquireError) -> Self {
        Self {
            result: Err(err),
            ..Self::new(cmd, args, ProcessResult::default())
        }
    }
}

/// A stub implementation of `CommandRunner` for testing.
///
/// Holds an ordered queue of expected invocations and answers each with its
/// predefined result, so tests can drive a backend without real tools. An
/// unexpected or mismatched invocation yields [`AcquireError::StubMismatch`].
#[derive(Debug)]
pub struct StubRunner {
    expected: RefCell<VecDeque<ExpectedCall>>,
    timeout: Duration,
}

impl StubRunner {
    /// Creates a new `StubRunner` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            timeout: crate::process::DEFAULT_TIMEOUT,
        }
    }

    /// Number of expected calls not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.expected.borrow().len()
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.borrow().is_empty(),
            "expected no further command invocations"
        );
    }
}

impl CommandRunner for StubRunner {
    fn run(&self, invocation: &CommandLineInvocation, _options: &ProcessOptions) -> Result<ProcessResult> {
        let call = self.expected.borrow_mut().pop_front().ok_or_else(|| {
            AcquireError::StubMismatch {
                message: format!("unexpected invocation: {invocation}"),
            }
        })?;

        let args_match = call
            .args
            .as_ref()
            .is_none_or(|args| args.as_slice() == invocation.arguments());
        if call.cmd != invocation.executable() || !args_match {
            return Err(AcquireError::StubMismatch {
                message: format!(
                    "expected {} {:?}, got {} {:?}",
                    call.cmd,
                    call.args,
                    invocation.executable(),
                    invocation.arguments()
                ),
            });
        }

        call.result
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
