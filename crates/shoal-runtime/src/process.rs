use crate::RuntimeError;
use std::process::{Command, Output};
use tracing::debug;

/// Render a command for logs and error messages.
pub(crate) fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().to_string()));
    parts.join(" ")
}

/// Run a command to completion and fail on a non-zero exit status.
pub(crate) fn run(cmd: &mut Command) -> Result<Output, RuntimeError> {
    let described = describe(cmd);
    debug!("running {described}");
    let output = cmd.output().map_err(|e| RuntimeError::CommandFailed {
        command: described.clone(),
        stderr: e.to_string(),
    })?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(RuntimeError::CommandFailed {
            command: described,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        })
    }
}

/// Split a configured command such as `docker compose` into program and
/// leading arguments.
pub(crate) fn command_from(spec: &str) -> Command {
    let mut words = spec.split_whitespace();
    let mut cmd = Command::new(words.next().unwrap_or(spec));
    cmd.args(words);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_from_splits_words() {
        let cmd = command_from("docker compose");
        assert_eq!(describe(&cmd), "docker compose");
    }

    #[test]
    fn run_reports_failure_with_command() {
        let err = run(Command::new("false").arg("--x")).unwrap_err();
        match err {
            RuntimeError::CommandFailed { command, .. } => assert_eq!(command, "false --x"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn run_returns_output_on_success() {
        let out = run(Command::new("echo").arg("hello")).unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }
}
