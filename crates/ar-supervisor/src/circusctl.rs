//! Supervisor backed by the `circusctl` command line client.
//!
//! Every call runs `circusctl [--endpoint E] --json <command>` and parses the
//! JSON reply printed on standard output:
//!
//! | command                      | reply                                         |
//! |------------------------------|-----------------------------------------------|
//! | `list`                       | `{"status": "ok", "watchers": [..]}`          |
//! | `options <name>`             | `{"status": "ok", "options": {"working_dir"}}`|
//! | `status <name>`              | `{"status": "active"}`                        |
//! | `kill <name> --signum <n>`   | `{"status": "ok"}`                            |
//!
//! Any reply with `"status": "error"` is a rejection.

use std::process::Stdio;
use std::time::Duration;

use ar_core::{SupervisorConfig, TargetName, TargetStatus};
use camino::Utf8PathBuf;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::{Supervisor, SupervisorError, TargetOptions};

/// Talks to a circus daemon through `circusctl`.
///
/// # Examples
///
/// ```
/// use ar_supervisor::CircusctlSupervisor;
/// use std::time::Duration;
///
/// let supervisor = CircusctlSupervisor::new("circusctl")
///     .with_endpoint("tcp://127.0.0.1:5555")
///     .with_timeout(Duration::from_secs(2));
/// assert_eq!(
///     supervisor.command_line(&["list"]),
///     ["circusctl", "--endpoint", "tcp://127.0.0.1:5555", "--json", "list"]
/// );
/// ```
#[derive(Debug, Clone)]
pub struct CircusctlSupervisor {
    program: String,
    leading_args: Vec<String>,
    endpoint: Option<String>,
    timeout: Duration,
}

impl CircusctlSupervisor {
    /// Creates a client running `program` with a five second timeout.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            endpoint: None,
            timeout: Duration::from_secs(5),
        }
    }

    /// Creates a client from configuration.
    #[must_use]
    pub fn from_config(config: &SupervisorConfig) -> Self {
        let supervisor = Self::new(config.program.clone()).with_timeout(config.timeout());
        match &config.endpoint {
            Some(endpoint) => supervisor.with_endpoint(endpoint.clone()),
            None => supervisor,
        }
    }

    /// Arguments placed before the global options, e.g. `-m circus.circusctl`
    /// when `program` is a Python interpreter.
    #[must_use]
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the daemon endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The full command line used for `args`.
    #[must_use]
    pub fn command_line(&self, args: &[&str]) -> Vec<String> {
        let mut line = Vec::with_capacity(args.len() + self.leading_args.len() + 4);
        line.push(self.program.clone());
        line.extend(self.leading_args.iter().cloned());
        if let Some(endpoint) = &self.endpoint {
            line.push("--endpoint".to_owned());
            line.push(endpoint.clone());
        }
        line.push("--json".to_owned());
        line.extend(args.iter().map(|arg| (*arg).to_owned()));
        line
    }

    async fn call(&self, args: &[&str]) -> Result<Value, SupervisorError> {
        let line = self.command_line(args);
        let command = line.join(" ");
        trace!(%command, "Running supervisor command");

        let child = Command::new(&self.program)
            .args(&line[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|source| SupervisorError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(SupervisorError::Timeout {
                    command,
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(SupervisorError::CommandFailed {
                command,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        let reply: Value = serde_json::from_slice(&output.stdout)?;
        debug!(%command, %reply, "Supervisor reply");
        check_reply(&command, reply)
    }
}

fn check_reply(command: &str, reply: Value) -> Result<Value, SupervisorError> {
    if reply.get("status").and_then(Value::as_str) == Some("error") {
        let reason = reply
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("no reason given")
            .to_owned();
        return Err(SupervisorError::Rejected {
            command: command.to_owned(),
            reason,
        });
    }
    Ok(reply)
}

fn parse<T: for<'de> Deserialize<'de>>(args: &[&str], reply: Value) -> Result<T, SupervisorError> {
    serde_json::from_value(reply).map_err(|err| SupervisorError::unexpected(args.join(" "), err.to_string()))
}

#[derive(Deserialize)]
struct ListReply {
    watchers: Vec<TargetName>,
}

#[derive(Deserialize)]
struct OptionsReply {
    options: RawOptions,
}

#[derive(Deserialize)]
struct RawOptions {
    #[serde(default)]
    working_dir: Option<String>,
}

#[derive(Deserialize)]
struct StatusReply {
    status: String,
}

impl Supervisor for CircusctlSupervisor {
    async fn list(&self) -> Result<Vec<TargetName>, SupervisorError> {
        let args = ["list"];
        let reply: ListReply = parse(&args, self.call(&args).await?)?;
        Ok(reply.watchers)
    }

    async fn options(&self, name: &TargetName) -> Result<TargetOptions, SupervisorError> {
        let args = ["options", name.as_str()];
        let reply: OptionsReply = parse(&args, self.call(&args).await?)?;
        let working_dir = reply
            .options
            .working_dir
            .filter(|dir| !dir.is_empty())
            .map(Utf8PathBuf::from);
        Ok(TargetOptions { working_dir })
    }

    async fn status(&self, name: &TargetName) -> Result<TargetStatus, SupervisorError> {
        let args = ["status", name.as_str()];
        let reply: StatusReply = parse(&args, self.call(&args).await?)?;
        Ok(TargetStatus::from_reply(&reply.status))
    }

    async fn kill(&self, name: &TargetName, signum: i32) -> Result<(), SupervisorError> {
        let signum = signum.to_string();
        self.call(&["kill", name.as_str(), "--signum", signum.as_str()])
            .await?;
        Ok(())
    }
}
