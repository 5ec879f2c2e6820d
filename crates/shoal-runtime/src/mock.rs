//! In-memory collaborators for tests and dry runs.
//!
//! Clones share state, so a test can hand one clone to the controller and
//! inspect another. The engine, launcher and firewall mocks can optionally
//! persist their state to a JSON file so that consecutive CLI invocations
//! observe each other's effects.

use crate::authority::CertificateAuthority;
use crate::election::{Election, LeaderSettings};
use crate::engine::EngineService;
use crate::firewall::Firewall;
use crate::launcher::{Launcher, RunningContainer};
use crate::RuntimeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shoal_schema::{
    ConfigDigest, ContainerRole, DaemonConfig, MaterialRole, NodeName, TlsMaterial, DIGEST_LABEL,
};
use shoal_store::write_if_changed;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn poisoned(e: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::Io(std::io::Error::other(format!("mutex poisoned: {e}")))
}

/// Mock state, optionally mirrored to a JSON file after every mutation.
struct MockCell<T> {
    state: Mutex<T>,
    persist: Option<PathBuf>,
}

impl<T: Default + Clone + Serialize + DeserializeOwned> MockCell<T> {
    fn in_memory() -> Self {
        Self {
            state: Mutex::new(T::default()),
            persist: None,
        }
    }

    fn persistent(path: &Path) -> Result<Self, RuntimeError> {
        let state = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(path)?)?
        } else {
            T::default()
        };
        Ok(Self {
            state: Mutex::new(state),
            persist: Some(path.to_path_buf()),
        })
    }

    fn read(&self) -> Result<T, RuntimeError> {
        Ok(self.state.lock().map_err(poisoned)?.clone())
    }

    fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, RuntimeError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        let result = f(&mut state);
        if let Some(path) = &self.persist {
            let content = serde_json::to_string_pretty(&*state)?;
            write_if_changed(path, content.as_bytes(), 0o600)?;
        }
        Ok(result)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EngineRecord {
    config: DaemonConfig,
    applies: u32,
    restarts: u32,
}

#[derive(Clone)]
pub struct MockEngine {
    cell: Arc<MockCell<EngineRecord>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            cell: Arc::new(MockCell::in_memory()),
        }
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persistent(path: &Path) -> Result<Self, RuntimeError> {
        Ok(Self {
            cell: Arc::new(MockCell::persistent(path)?),
        })
    }

    pub fn applies(&self) -> Result<u32, RuntimeError> {
        Ok(self.cell.read()?.applies)
    }

    pub fn restarts(&self) -> Result<u32, RuntimeError> {
        Ok(self.cell.read()?.restarts)
    }
}

impl EngineService for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn current_config(&self) -> Result<DaemonConfig, RuntimeError> {
        Ok(self.cell.read()?.config)
    }

    fn apply_config(&self, config: &DaemonConfig) -> Result<(), RuntimeError> {
        self.cell.update(|r| {
            r.config = config.clone();
            r.applies += 1;
        })
    }

    fn restart(&self) -> Result<(), RuntimeError> {
        self.cell.update(|r| r.restarts += 1)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LauncherRecord {
    running: Vec<RunningContainer>,
    stopped: BTreeSet<ContainerRole>,
    /// Every role passed to `up`, in call order.
    started: Vec<ContainerRole>,
    kills: u32,
    #[serde(default)]
    removes: u32,
}

/// Launcher that "runs" whatever the description file says, recording the
/// digest label each role was started with.
#[derive(Clone)]
pub struct MockLauncher {
    compose_file: PathBuf,
    cell: Arc<MockCell<LauncherRecord>>,
}

impl MockLauncher {
    pub fn new(compose_file: impl Into<PathBuf>) -> Self {
        Self {
            compose_file: compose_file.into(),
            cell: Arc::new(MockCell::in_memory()),
        }
    }

    pub fn persistent(compose_file: impl Into<PathBuf>, path: &Path) -> Result<Self, RuntimeError> {
        Ok(Self {
            compose_file: compose_file.into(),
            cell: Arc::new(MockCell::persistent(path)?),
        })
    }

    /// Roles passed to `up` so far, in call order.
    pub fn started(&self) -> Result<Vec<ContainerRole>, RuntimeError> {
        Ok(self.cell.read()?.started)
    }

    pub fn kills(&self) -> Result<u32, RuntimeError> {
        Ok(self.cell.read()?.kills)
    }

    pub fn removes(&self) -> Result<u32, RuntimeError> {
        Ok(self.cell.read()?.removes)
    }

    fn described_digest(&self, role: ContainerRole) -> Result<ConfigDigest, RuntimeError> {
        let malformed = |detail: String| RuntimeError::Malformed {
            what: self.compose_file.display().to_string(),
            detail,
        };
        let content = std::fs::read_to_string(&self.compose_file)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        value["services"][role.as_str()]["labels"][DIGEST_LABEL]
            .as_str()
            .map(ConfigDigest::new)
            .ok_or_else(|| malformed(format!("no {role} service described")))
    }
}

impl Launcher for MockLauncher {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn up(&self, roles: &[ContainerRole]) -> Result<(), RuntimeError> {
        let mut started = Vec::with_capacity(roles.len());
        for &role in roles {
            started.push(RunningContainer {
                role,
                digest: Some(self.described_digest(role)?),
            });
        }
        self.cell.update(|r| {
            for container in started {
                r.started.push(container.role);
                r.stopped.remove(&container.role);
                r.running.retain(|c| c.role != container.role);
                r.running.push(container);
            }
        })
    }

    fn running(&self) -> Result<Vec<RunningContainer>, RuntimeError> {
        Ok(self.cell.read()?.running)
    }

    fn kill(&self) -> Result<(), RuntimeError> {
        let killed = self.cell.update(|r| {
            if r.running.is_empty() {
                return false;
            }
            r.kills += 1;
            let roles: Vec<ContainerRole> = r.running.drain(..).map(|c| c.role).collect();
            r.stopped.extend(roles);
            true
        })?;
        if killed {
            Ok(())
        } else {
            Err(RuntimeError::NoSuchContainer("mock".to_owned()))
        }
    }

    fn remove(&self) -> Result<(), RuntimeError> {
        let removed = self.cell.update(|r| {
            if r.stopped.is_empty() {
                return false;
            }
            r.removes += 1;
            r.stopped.clear();
            true
        })?;
        if removed {
            Ok(())
        } else {
            Err(RuntimeError::NoSuchContainer("mock".to_owned()))
        }
    }
}

#[derive(Clone)]
pub struct MockFirewall {
    cell: Arc<MockCell<BTreeSet<u16>>>,
}

impl Default for MockFirewall {
    fn default() -> Self {
        Self {
            cell: Arc::new(MockCell::in_memory()),
        }
    }
}

impl MockFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persistent(path: &Path) -> Result<Self, RuntimeError> {
        Ok(Self {
            cell: Arc::new(MockCell::persistent(path)?),
        })
    }

    pub fn opened(&self) -> Result<BTreeSet<u16>, RuntimeError> {
        self.cell.read()
    }
}

impl Firewall for MockFirewall {
    fn open_port(&self, port: u16) -> Result<(), RuntimeError> {
        self.cell.update(|ports| {
            ports.insert(port);
        })
    }
}

/// Shared leader-settings board. Hand out one [`MemoryElection`] per node.
#[derive(Clone, Default)]
pub struct ElectionBoard {
    inner: Arc<Mutex<LeaderSettings>>,
    offline: Arc<AtomicBool>,
}

impl ElectionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, node: NodeName) -> MemoryElection {
        MemoryElection {
            board: self.clone(),
            node,
        }
    }

    /// Make `node` the leader. Broadcast settings survive the change.
    pub fn elect(&self, node: &NodeName) -> Result<(), RuntimeError> {
        self.inner.lock().map_err(poisoned)?.leader = Some(node.clone());
        Ok(())
    }

    pub fn settings(&self) -> Result<BTreeMap<String, String>, RuntimeError> {
        Ok(self.inner.lock().map_err(poisoned)?.settings.clone())
    }

    /// While offline, every handle fails its reads and writes.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn document(&self) -> Result<MutexGuard<'_, LeaderSettings>, RuntimeError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RuntimeError::NotReady("election board".to_owned()));
        }
        self.inner.lock().map_err(poisoned)
    }
}

#[derive(Clone)]
pub struct MemoryElection {
    board: ElectionBoard,
    node: NodeName,
}

impl MemoryElection {
    /// A single-node board on which `node` is the leader.
    pub fn solo(node: NodeName) -> Self {
        let board = ElectionBoard::new();
        if let Ok(mut doc) = board.inner.lock() {
            doc.leader = Some(node.clone());
        }
        board.handle(node)
    }
}

impl Election for MemoryElection {
    fn is_leader(&self) -> Result<bool, RuntimeError> {
        let doc = self.board.document()?;
        Ok(doc.leader.as_ref() == Some(&self.node))
    }

    fn set(&self, settings: &BTreeMap<String, String>) -> Result<(), RuntimeError> {
        let mut doc = self.board.document()?;
        if doc.leader.as_ref() != Some(&self.node) {
            return Err(RuntimeError::NotLeader);
        }
        doc.settings
            .extend(settings.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, RuntimeError> {
        let doc = self.board.document()?;
        Ok(doc.settings.get(key).cloned())
    }
}

#[derive(Debug, Default)]
struct AuthorityRecord {
    ready: bool,
    issued: BTreeMap<MaterialRole, u32>,
}

/// Authority issuing deterministic placeholder material.
#[derive(Clone)]
pub struct MockAuthority {
    state: Arc<Mutex<AuthorityRecord>>,
}

impl Default for MockAuthority {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(AuthorityRecord {
                ready: true,
                issued: BTreeMap::new(),
            })),
        }
    }
}

impl MockAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unready() -> Self {
        let authority = Self::default();
        if let Ok(mut state) = authority.state.lock() {
            state.ready = false;
        }
        authority
    }

    pub fn set_ready(&self, ready: bool) -> Result<(), RuntimeError> {
        self.state.lock().map_err(poisoned)?.ready = ready;
        Ok(())
    }

    pub fn issued(&self, role: MaterialRole) -> Result<u32, RuntimeError> {
        let state = self.state.lock().map_err(poisoned)?;
        Ok(state.issued.get(&role).copied().unwrap_or(0))
    }
}

fn pem(label: &str, seed: &str) -> String {
    let body = blake3::hash(seed.as_bytes()).to_hex();
    format!("-----BEGIN {label}-----\n{body}\n-----END {label}-----\n")
}

impl CertificateAuthority for MockAuthority {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn issue(
        &self,
        role: MaterialRole,
        common_name: &str,
        sans: &[String],
    ) -> Result<TlsMaterial, RuntimeError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        if !state.ready {
            return Err(RuntimeError::NotReady("mock authority".to_owned()));
        }
        *state.issued.entry(role).or_insert(0) += 1;
        let seed = format!("{role}:{common_name}:{}", sans.join(","));
        Ok(TlsMaterial {
            certificate: pem("CERTIFICATE", &seed),
            private_key: pem("PRIVATE KEY", &seed),
            certificate_authority: pem("CERTIFICATE", "mock-ca"),
        })
    }

    fn ca_certificate(&self) -> Result<String, RuntimeError> {
        if !self.state.lock().map_err(poisoned)?.ready {
            return Err(RuntimeError::NotReady("mock authority".to_owned()));
        }
        Ok(pem("CERTIFICATE", "mock-ca"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_schema::{LaunchDescription, RestartPolicy, ServiceSpec};

    fn write_description(path: &Path, image: &str) -> ConfigDigest {
        let agent = ServiceSpec {
            role: ContainerRole::Agent,
            image: image.to_owned(),
            restart: RestartPolicy::Always,
            command: vec!["join".to_owned()],
            ports: Vec::new(),
            volumes: Vec::new(),
        };
        let digest = agent.digest().unwrap();
        let desc = LaunchDescription::new("swarm").with_service(agent);
        std::fs::write(path, desc.render_compose().unwrap()).unwrap();
        digest
    }

    #[test]
    fn mock_engine_records_applies_and_restarts() {
        let engine = MockEngine::new();
        assert!(engine.current_config().unwrap().is_empty());
        let mut config = DaemonConfig::new();
        config.add("host", "tcp://10.0.0.5:2376");
        engine.apply_config(&config).unwrap();
        engine.restart().unwrap();
        assert_eq!(engine.current_config().unwrap(), config);
        assert_eq!(engine.applies().unwrap(), 1);
        assert_eq!(engine.restarts().unwrap(), 1);
    }

    #[test]
    fn persistent_engine_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let mut config = DaemonConfig::new();
        config.add_flag("tlsverify");
        MockEngine::persistent(&path)
            .unwrap()
            .apply_config(&config)
            .unwrap();
        let reopened = MockEngine::persistent(&path).unwrap();
        assert_eq!(reopened.current_config().unwrap(), config);
    }

    #[test]
    fn mock_launcher_reads_digests_from_description() {
        let dir = tempfile::tempdir().unwrap();
        let compose = dir.path().join("docker-compose.yml");
        let digest = write_description(&compose, "swarm:1.2.9");
        let launcher = MockLauncher::new(&compose);
        launcher.up(&[ContainerRole::Agent]).unwrap();
        assert_eq!(
            launcher.running().unwrap(),
            vec![RunningContainer {
                role: ContainerRole::Agent,
                digest: Some(digest),
            }]
        );
        assert!(launcher.up(&[ContainerRole::Manager]).is_err());
    }

    #[test]
    fn mock_launcher_kill_and_remove_report_absence() {
        let dir = tempfile::tempdir().unwrap();
        let compose = dir.path().join("docker-compose.yml");
        write_description(&compose, "swarm:1.2.9");
        let launcher = MockLauncher::new(&compose);
        assert!(matches!(
            launcher.kill(),
            Err(RuntimeError::NoSuchContainer(_))
        ));
        launcher.up(&[ContainerRole::Agent]).unwrap();
        launcher.kill().unwrap();
        assert!(launcher.running().unwrap().is_empty());
        launcher.remove().unwrap();
        assert!(matches!(
            launcher.remove(),
            Err(RuntimeError::NoSuchContainer(_))
        ));
        assert_eq!(launcher.kills().unwrap(), 1);
        assert_eq!(launcher.removes().unwrap(), 1);
    }

    #[test]
    fn offline_board_fails_every_handle() {
        let board = ElectionBoard::new();
        let n0 = NodeName::new("n0");
        let handle = board.handle(n0.clone());
        board.elect(&n0).unwrap();
        board.set_offline(true);
        assert!(matches!(handle.is_leader(), Err(RuntimeError::NotReady(_))));
        assert!(handle.get("manager_endpoint").is_err());
        board.set_offline(false);
        assert!(handle.is_leader().unwrap());
    }

    #[test]
    fn election_board_routes_settings_to_followers() {
        let board = ElectionBoard::new();
        let n0 = NodeName::new("n0");
        let leader = board.handle(n0.clone());
        let follower = board.handle(NodeName::new("n1"));
        board.elect(&n0).unwrap();

        let settings = BTreeMap::from([("manager_endpoint".to_owned(), "h:2377".to_owned())]);
        leader.set(&settings).unwrap();
        assert!(matches!(
            follower.set(&settings),
            Err(RuntimeError::NotLeader)
        ));
        assert_eq!(
            follower.get("manager_endpoint").unwrap().as_deref(),
            Some("h:2377")
        );
    }

    #[test]
    fn mock_authority_gates_on_readiness() {
        let ca = MockAuthority::unready();
        assert!(matches!(
            ca.issue(MaterialRole::Server, "n0", &[]),
            Err(RuntimeError::NotReady(_))
        ));
        ca.set_ready(true).unwrap();
        let a = ca.issue(MaterialRole::Server, "n0", &[]).unwrap();
        let b = ca.issue(MaterialRole::Server, "n0", &[]).unwrap();
        assert_eq!(a, b);
        assert!(a.is_complete());
        assert_eq!(ca.issued(MaterialRole::Server).unwrap(), 2);
        assert_eq!(ca.issued(MaterialRole::Client).unwrap(), 0);
    }
}
