//! Orchestrator: the manager/agent containers of this node.

use crate::CoreError;
use shoal_runtime::{Firewall, Launcher, RuntimeError};
use shoal_schema::{
    ConnectionString, ContainerRole, LaunchDescription, NodeConfig, PortBinding, RestartPolicy,
    Role, ServiceSpec,
};
use shoal_store::{write_if_changed, NodeLayout};
use tracing::{debug, info, warn};

/// Port the manager container listens on inside its network namespace.
pub const MANAGER_CONTAINER_PORT: u16 = 2375;

const CONTAINER_TLS_DIR: &str = "/etc/docker/tls";
const CONTAINER_DISCOVERY_DIR: &str = "/etc/docker/discovery";

/// What one `up` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpOutcome {
    /// Roles (re)started because they were missing or ran a stale configuration.
    pub started: Vec<ContainerRole>,
}

impl UpOutcome {
    pub fn is_noop(&self) -> bool {
        self.started.is_empty()
    }
}

pub struct Orchestrator<'a> {
    config: &'a NodeConfig,
    layout: &'a NodeLayout,
    launcher: &'a dyn Launcher,
    firewall: &'a dyn Firewall,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a NodeConfig,
        layout: &'a NodeLayout,
        launcher: &'a dyn Launcher,
        firewall: &'a dyn Firewall,
    ) -> Self {
        Self {
            config,
            layout,
            launcher,
            firewall,
        }
    }

    /// The launch description for `role`. The manager role is included only
    /// on the leader.
    pub fn describe(&self, role: Role, connection: &ConnectionString, tls: bool) -> LaunchDescription {
        let mut discovery_volumes = Vec::new();
        let mut discovery_args = Vec::new();
        if connection.is_secure() {
            discovery_volumes.push(format!(
                "{}:{CONTAINER_DISCOVERY_DIR}:ro",
                self.layout.discovery_tls_dir().display()
            ));
            for (key, file) in [
                ("kv.cacertfile", "ca.crt"),
                ("kv.certfile", "client.crt"),
                ("kv.keyfile", "client.key"),
            ] {
                discovery_args.push(format!(
                    "--discovery-opt={key}={CONTAINER_DISCOVERY_DIR}/{file}"
                ));
            }
        }

        let mut agent_command = vec![
            "join".to_owned(),
            format!("--advertise={}", self.config.cluster_endpoint()),
        ];
        agent_command.extend(discovery_args.iter().cloned());
        agent_command.push(connection.swarm_path());

        let mut desc = LaunchDescription::new(&self.config.swarm.project).with_service(ServiceSpec {
            role: ContainerRole::Agent,
            image: self.config.swarm.image.clone(),
            restart: RestartPolicy::Always,
            command: agent_command,
            ports: Vec::new(),
            volumes: discovery_volumes.clone(),
        });

        if role.is_leader() {
            let mut volumes = discovery_volumes;
            let mut manager_command = vec!["manage".to_owned()];
            if tls {
                volumes.push(format!("{}:{CONTAINER_TLS_DIR}:ro", self.layout.tls_dir().display()));
                manager_command.extend([
                    "--tlsverify".to_owned(),
                    format!("--tlscacert={CONTAINER_TLS_DIR}/ca.crt"),
                    format!("--tlscert={CONTAINER_TLS_DIR}/server.crt"),
                    format!("--tlskey={CONTAINER_TLS_DIR}/server.key"),
                ]);
            }
            manager_command.extend(discovery_args);
            manager_command.push(connection.swarm_path());
            desc = desc.with_service(ServiceSpec {
                role: ContainerRole::Manager,
                image: self.config.swarm.image.clone(),
                restart: RestartPolicy::Always,
                command: manager_command,
                ports: vec![PortBinding {
                    host: self.config.swarm.manager_port,
                    container: MANAGER_CONTAINER_PORT,
                }],
                volumes,
            });
        }
        desc
    }

    /// Converge the running containers onto `desc`: render the description
    /// file, start only roles that are missing or run a different
    /// configuration, then open the cluster port (and the manager port on
    /// the leader).
    pub fn up(&self, role: Role, desc: &LaunchDescription) -> Result<UpOutcome, CoreError> {
        let rendered = desc.render_compose()?;
        if write_if_changed(&self.layout.compose_file(), rendered.as_bytes(), 0o644)? {
            debug!("rendered {}", self.layout.compose_file().display());
        }

        let running = self.launcher.running()?;
        let mut started = Vec::new();
        for spec in desc.services() {
            let digest = spec.digest()?;
            let current = running
                .iter()
                .any(|c| c.role == spec.role && c.digest.as_ref() == Some(&digest));
            if !current {
                started.push(spec.role);
            }
        }

        if started.is_empty() {
            debug!("all described roles already running");
        } else {
            info!(
                "starting {}",
                started
                    .iter()
                    .map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            self.launcher.up(&started)?;
        }

        self.firewall.open_port(self.config.engine.cluster_port)?;
        if role.is_leader() {
            self.firewall.open_port(self.config.swarm.manager_port)?;
        }
        Ok(UpOutcome { started })
    }

    /// Signal every container. Absence and failures are logged, never raised.
    pub fn kill(&self) {
        best_effort("kill", self.launcher.kill());
    }

    /// Remove stopped containers. Absence and failures are logged, never raised.
    pub fn remove(&self) {
        best_effort("remove", self.launcher.remove());
    }

    pub fn teardown(&self) {
        info!("tearing down {} containers", self.config.swarm.project);
        self.kill();
        self.remove();
    }
}

fn best_effort(what: &str, result: Result<(), RuntimeError>) {
    match result {
        Ok(()) => {}
        Err(RuntimeError::NoSuchContainer(name)) => debug!("{what}: nothing to do for {name}"),
        Err(e) => warn!("{what} failed, continuing teardown: {e}"),
    }
}
