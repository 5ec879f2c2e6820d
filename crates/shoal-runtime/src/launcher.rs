use crate::process::{command_from, describe, run};
use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use shoal_schema::{ConfigDigest, ContainerRole, DIGEST_LABEL};
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info};

const PROJECT_LABEL: &str = "com.docker.compose.project";
const SERVICE_LABEL: &str = "com.docker.compose.service";

/// A container of this node's compose project that is currently running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningContainer {
    pub role: ContainerRole,
    /// Digest label of the service configuration it was started from.
    pub digest: Option<ConfigDigest>,
}

/// Compose-style launcher operating on one declarative description file.
///
/// The controller re-renders that file before every `up`.
pub trait Launcher: Send + Sync {
    fn name(&self) -> &str;

    /// Start (or recreate) the given roles from the description file.
    fn up(&self, roles: &[ContainerRole]) -> Result<(), RuntimeError>;

    fn running(&self) -> Result<Vec<RunningContainer>, RuntimeError>;

    /// Signal every container of the project. Fails with
    /// [`RuntimeError::NoSuchContainer`] when nothing is running.
    fn kill(&self) -> Result<(), RuntimeError>;

    /// Remove every stopped container of the project.
    fn remove(&self) -> Result<(), RuntimeError>;
}

pub struct ComposeLauncher {
    compose_command: String,
    compose_file: PathBuf,
    project: String,
}

impl ComposeLauncher {
    pub fn new(
        compose_command: impl Into<String>,
        compose_file: impl Into<PathBuf>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            compose_command: compose_command.into(),
            compose_file: compose_file.into(),
            project: project.into(),
        }
    }

    fn compose(&self) -> Command {
        let mut cmd = command_from(&self.compose_command);
        cmd.arg("-f")
            .arg(&self.compose_file)
            .args(["-p", &self.project]);
        cmd
    }

    fn run_tolerating_absence(&self, mut cmd: Command) -> Result<(), RuntimeError> {
        match run(&mut cmd) {
            Ok(_) => Ok(()),
            Err(RuntimeError::CommandFailed { stderr, .. }) if is_absence(&stderr) => {
                Err(RuntimeError::NoSuchContainer(self.project.clone()))
            }
            Err(e) => Err(e),
        }
    }
}

fn is_absence(stderr: &str) -> bool {
    let msg = stderr.to_lowercase();
    msg.contains("no such container")
        || msg.contains("is not running")
        || msg.contains("no containers to")
}

/// Parse `docker ps` lines of the form `<service>\t<digest>`.
fn parse_running(stdout: &str) -> Vec<RunningContainer> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let role = match fields.next()?.trim() {
                "manager" => ContainerRole::Manager,
                "agent" => ContainerRole::Agent,
                _ => return None,
            };
            let digest = fields
                .next()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(ConfigDigest::new);
            Some(RunningContainer { role, digest })
        })
        .collect()
}

impl Launcher for ComposeLauncher {
    fn name(&self) -> &'static str {
        "compose"
    }

    fn up(&self, roles: &[ContainerRole]) -> Result<(), RuntimeError> {
        let mut cmd = self.compose();
        cmd.args(["up", "-d", "--no-deps"]);
        cmd.args(roles.iter().map(|r| r.as_str()));
        info!("starting {}", describe(&cmd));
        run(&mut cmd)?;
        Ok(())
    }

    fn running(&self) -> Result<Vec<RunningContainer>, RuntimeError> {
        let format = format!("{{{{.Label \"{SERVICE_LABEL}\"}}}}\t{{{{.Label \"{DIGEST_LABEL}\"}}}}");
        let output = run(Command::new("docker").args([
            "ps",
            "--filter",
            &format!("label={PROJECT_LABEL}={}", self.project),
            "--filter",
            "status=running",
            "--format",
            &format,
        ]))?;
        let running = parse_running(&String::from_utf8_lossy(&output.stdout));
        debug!("{} running containers in {}", running.len(), self.project);
        Ok(running)
    }

    fn kill(&self) -> Result<(), RuntimeError> {
        let mut cmd = self.compose();
        cmd.arg("kill");
        self.run_tolerating_absence(cmd)
    }

    fn remove(&self) -> Result<(), RuntimeError> {
        let mut cmd = self.compose();
        cmd.args(["rm", "-f"]);
        self.run_tolerating_absence(cmd)
    }
}
