use crate::authority::{CertificateAuthority, DirectoryAuthority};
use crate::election::{Election, FileElection};
use crate::engine::{EngineService, SystemdEngine};
use crate::firewall::{Firewall, UfwFirewall};
use crate::launcher::{ComposeLauncher, Launcher};
use crate::mock::{MemoryElection, MockAuthority, MockEngine, MockFirewall, MockLauncher};
use crate::RuntimeError;
use shoal_schema::{BackendKind, NodeConfig};
use shoal_store::NodeLayout;
use tracing::debug;

/// The external collaborators one controller instance talks to.
pub struct Backends {
    pub engine: Box<dyn EngineService>,
    pub launcher: Box<dyn Launcher>,
    pub firewall: Box<dyn Firewall>,
    pub election: Box<dyn Election>,
    pub authority: Box<dyn CertificateAuthority>,
}

/// Wire each collaborator according to its `backend` setting.
///
/// Mock engine, launcher and firewall keep their state under
/// `<state_dir>/mock/` so that separate invocations see each other's effects.
/// The mock election is a single-node board on which this node leads.
pub fn select_backends(config: &NodeConfig, layout: &NodeLayout) -> Result<Backends, RuntimeError> {
    let mock_dir = layout.root().join("mock");
    let compose_file = layout.compose_file();

    let engine: Box<dyn EngineService> = match config.engine.backend {
        BackendKind::System => Box::new(SystemdEngine::new(
            &config.engine.config_file,
            &config.engine.service,
        )),
        BackendKind::Mock => Box::new(MockEngine::persistent(&mock_dir.join("engine.json"))?),
    };

    let launcher: Box<dyn Launcher> = match config.swarm.backend {
        BackendKind::System => Box::new(ComposeLauncher::new(
            &config.swarm.compose_command,
            &compose_file,
            &config.swarm.project,
        )),
        BackendKind::Mock => Box::new(MockLauncher::persistent(
            &compose_file,
            &mock_dir.join("launcher.json"),
        )?),
    };

    let firewall: Box<dyn Firewall> = match config.firewall.backend {
        BackendKind::System => Box::new(UfwFirewall),
        BackendKind::Mock => Box::new(MockFirewall::persistent(&mock_dir.join("firewall.json"))?),
    };

    let election: Box<dyn Election> = match config.leadership.backend {
        BackendKind::System => Box::new(FileElection::new(
            config.settings_file(),
            config.node.name.clone(),
        )),
        BackendKind::Mock => Box::new(MemoryElection::solo(config.node.name.clone())),
    };

    let authority: Box<dyn CertificateAuthority> = match config.authority.backend {
        BackendKind::System => Box::new(DirectoryAuthority::new(config.authority_inbox())),
        BackendKind::Mock => Box::new(MockAuthority::new()),
    };

    debug!(
        "backends: engine={} launcher={} authority={}",
        engine.name(),
        launcher.name(),
        authority.name()
    );

    Ok(Backends {
        engine,
        launcher,
        firewall,
        election,
        authority,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_schema::parse_config_str;

    fn config(backend: &str, state_dir: &std::path::Path) -> NodeConfig {
        parse_config_str(&format!(
            r#"
config_version = 1
state_dir = "{}"

[node]
name = "swarm-0"
private_address = "10.0.0.5"
public_address = "203.0.113.5"

[engine]
backend = "{backend}"

[swarm]
backend = "{backend}"

[leadership]
backend = "{backend}"

[authority]
backend = "{backend}"

[firewall]
backend = "{backend}"
"#,
            state_dir.display()
        ))
        .unwrap()
    }

    #[test]
    fn selects_system_backends() {
        let dir = tempfile::tempdir().unwrap();
        let layout = NodeLayout::new(dir.path());
        let backends = select_backends(&config("system", dir.path()), &layout).unwrap();
        assert_eq!(backends.engine.name(), "systemd");
        assert_eq!(backends.launcher.name(), "compose");
        assert_eq!(backends.authority.name(), "directory");
    }

    #[test]
    fn selects_mock_backends_with_solo_leadership() {
        let dir = tempfile::tempdir().unwrap();
        let layout = NodeLayout::new(dir.path());
        let backends = select_backends(&config("mock", dir.path()), &layout).unwrap();
        assert_eq!(backends.engine.name(), "mock");
        assert_eq!(backends.launcher.name(), "mock");
        assert!(backends.election.is_leader().unwrap());
    }
}
