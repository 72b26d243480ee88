//! External process execution
//!
//! Every `git` and `fal` call goes through a [`CommandRunner`], so the
//! client can be driven by a scripted runner in tests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use falform_core::provider::BoxFuture;
use log::{debug, warn};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{FalError, FalResult};

const MASK: &str = "****";

/// A fully described external command
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; inherits the provider's when `None`
    pub cwd: Option<PathBuf>,
    secrets: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            secrets: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Mark a string that must never appear in logs or error messages
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// Command line with every secret masked
    pub fn redacted(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                self.secrets
                    .iter()
                    .fold(part.to_string(), |acc, secret| acc.replace(secret.as_str(), MASK))
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("command", &self.redacted())
            .field("cwd", &self.cwd)
            .finish()
    }
}

/// Runs external commands and returns their combined output
pub trait CommandRunner: Send + Sync {
    /// Run to completion. A non-zero exit is an error carrying the output;
    /// cancelling `cancel` terminates the child.
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, FalResult<String>>;
}

/// Runner backed by real child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run<'a>(
        &'a self,
        invocation: &'a Invocation,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, FalResult<String>> {
        Box::pin(async move {
            let mut cmd = Command::new(&invocation.program);
            cmd.args(&invocation.args)
                .stdin(Stdio::null())
                .kill_on_drop(true);
            if let Some(dir) = &invocation.cwd {
                cmd.current_dir(dir);
            }

            debug!("running `{}`", invocation);

            // Dropping the output future drops the child, which kills it.
            let output = tokio::select! {
                () = cancel.cancelled() => {
                    warn!("cancelled `{}`", invocation);
                    return Err(FalError::Cancelled);
                }
                result = cmd.output() => result.map_err(|source| FalError::Spawn {
                    program: invocation.program.clone(),
                    source,
                })?,
            };

            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));

            if output.status.success() {
                Ok(combined)
            } else {
                Err(FalError::CommandFailed {
                    command: invocation.redacted(),
                    status: output.status.to_string(),
                    output: combined,
                })
            }
        })
    }
}
