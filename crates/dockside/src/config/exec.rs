//! Exec instance configuration.

use dockside_error::CommonError;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Body of `POST /containers/{id}/exec`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecSpec {
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
    /// Not sent at creation; used when the exec is started.
    #[serde(skip)]
    pub detach: bool,
    /// `[height, width]` of the initial TTY.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_size: Option<[u16; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detach_keys: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub env: Vec<String>,
    pub cmd: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub privileged: bool,
}

/// A command to run inside a running container, plus its ID once created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecConfig {
    /// Set by [`Client::exec_create`](crate::Client::exec_create).
    pub id: Option<String>,
    pub spec: ExecSpec,
}

impl ExecConfig {
    /// Creates an exec running `cmd` with stdout and stderr attached.
    pub fn new<I, S>(cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: None,
            spec: ExecSpec {
                attach_stdout: true,
                attach_stderr: true,
                cmd: cmd.into_iter().map(Into::into).collect(),
                ..Default::default()
            },
        }
    }

    pub fn with_tty(mut self, tty: bool) -> Self {
        self.spec.tty = tty;
        self
    }

    pub fn with_attach_stdin(mut self, attach: bool) -> Self {
        self.spec.attach_stdin = attach;
        self
    }

    pub fn with_attach_stdout(mut self, attach: bool) -> Self {
        self.spec.attach_stdout = attach;
        self
    }

    pub fn with_attach_stderr(mut self, attach: bool) -> Self {
        self.spec.attach_stderr = attach;
        self
    }

    /// Starts the exec without streaming its output back.
    pub fn with_detach(mut self, detach: bool) -> Self {
        self.spec.detach = detach;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.spec.user = Some(user.into());
        self
    }

    /// Adds a `KEY=value` environment variable.
    pub fn with_env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.spec
            .env
            .push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.spec.working_dir = Some(dir.into());
        self
    }

    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.spec.privileged = privileged;
        self
    }

    /// Key sequence that detaches from the exec, e.g. `ctrl-p,ctrl-q`.
    pub fn with_detach_keys(mut self, keys: impl Into<String>) -> Self {
        self.spec.detach_keys = Some(keys.into());
        self
    }

    pub fn with_console_size(mut self, width: u16, height: u16) -> Self {
        self.spec.console_size = Some([height, width]);
        self
    }

    /// Returns the exec ID, or an error if it has not been created yet.
    pub fn id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CommonError::invalid_state("exec has not been created").into())
    }

    pub(crate) fn start_body(&self) -> ExecStartBody {
        ExecStartBody {
            detach: self.spec.detach,
            tty: self.spec.tty,
            console_size: self.spec.console_size,
        }
    }
}

/// Body of `POST /exec/{id}/start`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ExecStartBody {
    pub detach: bool,
    pub tty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_size: Option<[u16; 2]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_body() {
        let exec = ExecConfig::new(["sh", "-c", "echo hi"])
            .with_tty(true)
            .with_attach_stdin(true)
            .with_env("TERM", "xterm")
            .with_console_size(120, 40)
            .with_detach(true);

        let json = serde_json::to_value(&exec.spec).unwrap();
        assert_eq!(json["Cmd"], serde_json::json!(["sh", "-c", "echo hi"]));
        assert_eq!(json["AttachStdin"], true);
        assert_eq!(json["AttachStdout"], true);
        assert_eq!(json["ConsoleSize"], serde_json::json!([40, 120]));
        assert!(json.get("Detach").is_none());

        let start = serde_json::to_value(exec.start_body()).unwrap();
        assert_eq!(start["Detach"], true);
        assert_eq!(start["Tty"], true);
    }

    #[test]
    fn test_id_before_create_is_invalid_state() {
        let exec = ExecConfig::new(["true"]);
        assert!(matches!(
            exec.id(),
            Err(crate::Error::Common(CommonError::InvalidState(_)))
        ));
    }
}
