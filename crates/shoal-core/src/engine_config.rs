//! Engine Configurator: desired daemon configuration and change-gated apply.

use crate::CoreError;
use shoal_runtime::{EngineService, RuntimeError};
use shoal_schema::{ConnectionString, DaemonConfig, NodeConfig, Role};
use shoal_store::NodeLayout;
use tracing::{debug, info, warn};

pub struct EngineConfigurator<'a> {
    config: &'a NodeConfig,
    layout: &'a NodeLayout,
    engine: &'a dyn EngineService,
}

impl<'a> EngineConfigurator<'a> {
    pub fn new(config: &'a NodeConfig, layout: &'a NodeLayout, engine: &'a dyn EngineService) -> Self {
        Self {
            config,
            layout,
            engine,
        }
    }

    /// Desired engine flags for this node.
    pub fn compute_config(
        &self,
        role: Role,
        connection: &ConnectionString,
        tls_enabled: bool,
    ) -> DaemonConfig {
        let cluster_endpoint = self.config.cluster_endpoint();
        let mut desired = DaemonConfig::new();
        desired
            .add("host", format!("tcp://{cluster_endpoint}"))
            .add("host", self.config.engine.socket.as_str())
            .add("cluster-advertise", cluster_endpoint.as_str())
            .add("cluster-store", connection.to_string());

        if connection.is_secure() {
            desired
                .add(
                    "cluster-store-opt",
                    format!("kv.cacertfile={}", self.layout.discovery_ca().display()),
                )
                .add(
                    "cluster-store-opt",
                    format!("kv.certfile={}", self.layout.discovery_cert().display()),
                )
                .add(
                    "cluster-store-opt",
                    format!("kv.keyfile={}", self.layout.discovery_key().display()),
                );
        }

        if tls_enabled {
            desired
                .add("tlscert", self.layout.server_cert().display().to_string())
                .add("tlskey", self.layout.server_key().display().to_string())
                .add("tlscacert", self.layout.server_ca().display().to_string())
                .add_flag("tlsverify");
        }

        desired.add("label", format!("swarm.role={role}"));
        desired
    }

    /// Write `desired` unless the engine already runs with an equal option
    /// multiset. An unreadable existing config counts as different and is
    /// overwritten. Never restarts; returns whether anything was written.
    pub fn apply(&self, desired: &DaemonConfig) -> Result<bool, CoreError> {
        match self.engine.current_config() {
            Ok(current) if current == *desired => {
                debug!("engine config unchanged");
                return Ok(false);
            }
            Ok(_) => {}
            Err(RuntimeError::Malformed { what, detail }) => {
                warn!("replacing unrecognized engine config {what}: {detail}");
            }
            Err(e) => return Err(e.into()),
        }
        self.engine.apply_config(desired)?;
        info!("engine config changed ({} options)", desired.options().len());
        Ok(true)
    }

    pub fn restart(&self) -> Result<(), CoreError> {
        info!("restarting engine via {}", self.engine.name());
        self.engine.restart()?;
        Ok(())
    }
}
