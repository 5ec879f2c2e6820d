use crate::concurrency::NodeLock;
use crate::credentials::CredentialManager;
use crate::discovery::DiscoveryAdapter;
use crate::engine_config::EngineConfigurator;
use crate::leadership::LeadershipCoordinator;
use crate::lifecycle::{validate_transition, Stage};
use crate::orchestrator::Orchestrator;
use crate::rules::{Action, Rule, RULES};
use crate::status::Status;
use crate::tracker::{ConditionTracker, Fact, Owner, Transition};
use crate::{CoreError, ErrorClass};
use serde::Serialize;
use shoal_runtime::{select_backends, Backends};
use shoal_schema::{ConnectionString, DaemonConfig, Event, LaunchDescription, NodeConfig, Role};
use shoal_store::{ClientBundle, NodeLayout, NodeState, StateStore, TlsStore};
use tracing::{debug, info, warn};

/// A rule action that failed during a pass. The rule stays unlatched and is
/// retried on the next delivery.
#[derive(Debug, Clone, Serialize)]
pub struct RuleFailure {
    pub rule: &'static str,
    pub class: ErrorClass,
    pub message: String,
}

/// Outcome of one delivery.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub event: &'static str,
    pub role: Role,
    pub stage: Stage,
    pub status: Status,
    /// Rules that fired, in firing order.
    pub fired: Vec<&'static str>,
    pub failures: Vec<RuleFailure>,
    pub facts: Vec<&'static str>,
}

/// Engine flags and launch description this node converges towards.
#[derive(Debug, Clone, Serialize)]
pub struct DesiredState {
    pub role: Role,
    pub connection: ConnectionString,
    pub daemon: DaemonConfig,
    pub daemon_args: String,
    pub launch: LaunchDescription,
}

/// Per-node convergence controller.
///
/// Each call to [`Controller::handle`] is one event delivery: the event's
/// external facts are recorded, then every rule is evaluated once in table
/// order. State is persisted under the node's state directory between
/// deliveries, so separate processes can drive the same node.
pub struct Controller {
    config: NodeConfig,
    layout: NodeLayout,
    backends: Backends,
    states: StateStore,
}

fn linked(state: &NodeState) -> Result<&ConnectionString, CoreError> {
    state.connection.as_ref().ok_or(CoreError::NotLinked)
}

/// Record the facts an event carries. Only relation-owned facts change here.
fn intake(
    event: &Event,
    tracker: &mut ConditionTracker,
    state: &mut NodeState,
) -> Result<(), CoreError> {
    let transition = match event {
        Event::DiscoveryJoined { discovery } => {
            if state.connection.is_some() && state.discovery.as_ref() != Some(discovery) {
                info!("discovery data changed; the current link is kept until the relation departs");
            }
            state.discovery = Some(discovery.clone());
            Transition::asserting(&[Fact::DiscoveryConnected])
        }
        Event::DiscoveryDeparted => {
            state.discovery = None;
            Transition::retracting(&[Fact::DiscoveryConnected])
        }
        Event::EngineReady => Transition::asserting(&[Fact::EngineAvailable]),
        Event::EngineStopped => Transition::retracting(&[Fact::EngineAvailable]),
        Event::CaReady => Transition::asserting(&[Fact::CaAvailable]),
        Event::LeadershipChanged | Event::BroadcastChanged | Event::Update => Transition::none(),
    };
    tracker.commit(Owner::Relation, &transition)
}

impl Controller {
    /// Controller over explicitly provided collaborators.
    pub fn new(config: NodeConfig, backends: Backends) -> Result<Self, CoreError> {
        let layout = NodeLayout::new(&config.state_dir);
        layout.initialize()?;
        Ok(Self {
            states: StateStore::new(layout.clone()),
            config,
            layout,
            backends,
        })
    }

    /// Controller with collaborators chosen by the config's backend settings.
    pub fn open(config: NodeConfig) -> Result<Self, CoreError> {
        let layout = NodeLayout::new(&config.state_dir);
        layout.initialize()?;
        let backends = select_backends(&config, &layout)?;
        Self::new(config, backends)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn layout(&self) -> &NodeLayout {
        &self.layout
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    fn leadership(&self) -> LeadershipCoordinator<'_> {
        LeadershipCoordinator::new(self.backends.election.as_ref())
    }

    fn credentials(&self) -> CredentialManager<'_> {
        CredentialManager::new(&self.config, &self.layout, self.backends.authority.as_ref())
    }

    fn engine(&self) -> EngineConfigurator<'_> {
        EngineConfigurator::new(&self.config, &self.layout, self.backends.engine.as_ref())
    }

    fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(
            &self.config,
            &self.layout,
            self.backends.launcher.as_ref(),
            self.backends.firewall.as_ref(),
        )
    }

    /// Deliver one event and run one evaluation pass.
    ///
    /// Action failures are reported in the returned [`Report`]; only state
    /// store and other infrastructure failures abort the delivery, in which
    /// case nothing is persisted.
    pub fn handle(&self, event: &Event) -> Result<Report, CoreError> {
        let _lock = NodeLock::acquire(&self.layout.lock_file())?;
        let mut state = self.states.load()?;
        let mut tracker = ConditionTracker::from_names(&state.facts)?;

        info!("delivering {}", event.name());
        intake(event, &mut tracker, &mut state)?;
        let report = self.evaluate(event.name(), &mut tracker, &mut state)?;

        state.facts = tracker.names();
        self.states.save(&state)?;
        Ok(report)
    }

    /// Report the persisted status without delivering anything.
    pub fn inspect(&self) -> Result<Report, CoreError> {
        let state = self.states.load()?;
        let tracker = ConditionTracker::from_names(&state.facts)?;
        let mut failures = Vec::new();
        let role = self
            .resolve_role(&mut failures)
            .or(state.role)
            .unwrap_or(Role::Follower);
        Ok(Report {
            event: "status",
            role,
            stage: Stage::derive(&tracker, role),
            status: Status::derive(&tracker, role, state.degraded, state.blocked.as_deref()),
            fired: Vec::new(),
            failures,
            facts: tracker.set_facts().map(Fact::name).collect(),
        })
    }

    /// The persisted controller state.
    pub fn state(&self) -> Result<NodeState, CoreError> {
        Ok(self.states.load()?)
    }

    /// What the engine and launcher are being converged to. Requires a
    /// linked discovery backend.
    pub fn desired(&self) -> Result<DesiredState, CoreError> {
        let state = self.states.load()?;
        let tracker = ConditionTracker::from_names(&state.facts)?;
        let role = self.leadership().role()?;
        let connection = linked(&state)?.clone();
        let daemon =
            self.engine()
                .compute_config(role, &connection, tracker.is_set(Fact::ServerPlaced));
        let launch =
            self.orchestrator()
                .describe(role, &connection, tracker.is_set(Fact::EngineSecured));
        Ok(DesiredState {
            role,
            daemon_args: daemon.render_args()?,
            connection,
            daemon,
            launch,
        })
    }

    /// Re-package the client bundle from the placed client material.
    pub fn package_bundle(&self) -> Result<ClientBundle, CoreError> {
        let _lock = NodeLock::acquire(&self.layout.lock_file())?;
        let credentials = self.credentials();
        let material = credentials.load_client_material()?;
        credentials.package_client_bundle(&material, &self.config.node.public_address)
    }

    /// The current role, or `None` when the lookup failed. The failure is
    /// recorded as a `resolve-role` entry in `failures`.
    fn resolve_role(&self, failures: &mut Vec<RuleFailure>) -> Option<Role> {
        match self.leadership().role() {
            Ok(role) => Some(role),
            Err(e) => {
                warn!("role lookup failed, holding role-dependent rules: {e}");
                failures.push(RuleFailure {
                    rule: "resolve-role",
                    class: e.class(),
                    message: e.to_string(),
                });
                None
            }
        }
    }

    fn evaluate(
        &self,
        event: &'static str,
        tracker: &mut ConditionTracker,
        state: &mut NodeState,
    ) -> Result<Report, CoreError> {
        let mut failures = Vec::new();
        let resolved = self.resolve_role(&mut failures);
        if resolved.is_some() {
            state.role = resolved;
        }
        // Stage and status fall back to the last known role.
        let role = resolved.or(state.role).unwrap_or(Role::Follower);
        let before = Stage::derive(tracker, role);
        let mut fired = Vec::new();
        let mut blocker = None;

        for rule in RULES {
            if resolved.is_none() && rule.role_dependent() {
                continue;
            }
            if !rule.guard.holds(tracker, role) {
                if state.latches.remove(rule.name) {
                    debug!("{} re-armed", rule.name);
                }
                continue;
            }
            if state.latches.contains(rule.name) {
                continue;
            }

            debug!("firing {}", rule.name);
            match self.run(rule, role, tracker, state) {
                Ok(transition) => {
                    tracker.commit(rule.owner, &transition)?;
                    state.latches.insert(rule.name.to_owned());
                    fired.push(rule.name);
                }
                Err(e) => match e.class() {
                    ErrorClass::Infrastructure => return Err(e),
                    class => {
                        warn!("{} failed ({class}): {e}", rule.name);
                        if class == ErrorClass::Malformed && blocker.is_none() {
                            blocker = Some(e.to_string());
                        }
                        failures.push(RuleFailure {
                            rule: rule.name,
                            class,
                            message: e.to_string(),
                        });
                    }
                },
            }
        }

        let stage = Stage::derive(tracker, role);
        validate_transition(before, stage)?;
        if stage != before {
            info!("stage {before} -> {stage}");
        }
        state.blocked = blocker;
        let status = Status::derive(tracker, role, state.degraded, state.blocked.as_deref());
        info!("{} fired, status {status}", fired.len());

        Ok(Report {
            event,
            role,
            stage,
            status,
            fired,
            failures,
            facts: tracker.set_facts().map(Fact::name).collect(),
        })
    }

    fn run(
        &self,
        rule: &Rule,
        role: Role,
        tracker: &ConditionTracker,
        state: &mut NodeState,
    ) -> Result<Transition, CoreError> {
        use crate::tracker::Fact::{
            BundlePlaced, ClientMinted, ClientPlaced, ClusterAvailable, ClusterSecured,
            DiscoveryAvailable, EngineConfigured, EngineLeaderLabel, EngineSecured, ManagerAnnounced,
            ManagerRunning, RestartRequested, ServerPlaced,
        };

        match rule.action {
            Action::UnlinkDiscovery => {
                if let Some(connection) = state.connection.take() {
                    info!("discovery link to {connection} lost");
                }
                Ok(Transition::retracting(&[DiscoveryAvailable]))
            }
            Action::TeardownCluster => {
                self.orchestrator().teardown();
                state.degraded = true;
                Ok(Transition::retracting(&[
                    ClusterAvailable,
                    ClusterSecured,
                    ManagerRunning,
                ]))
            }
            Action::ResetEngine => Ok(Transition::retracting(&[
                EngineConfigured,
                EngineSecured,
                EngineLeaderLabel,
            ])),
            Action::WithdrawManager => {
                info!("manager no longer announced by this node");
                Ok(Transition::retracting(&[ManagerAnnounced]))
            }
            Action::LinkDiscovery => {
                let discovery = state
                    .discovery
                    .as_ref()
                    .ok_or(CoreError::MissingDiscoveryData)?;
                let tls = TlsStore::new(self.layout.clone());
                let connection = DiscoveryAdapter::new(&tls).link(discovery)?;
                state.connection = Some(connection);
                Ok(Transition::asserting(&[DiscoveryAvailable]))
            }
            Action::IssueServerMaterial => {
                self.credentials().issue_server_material()?;
                Ok(Transition::asserting(&[ServerPlaced]))
            }
            Action::ConfigureEngine => {
                self.configure_engine(role, tracker.is_set(ServerPlaced), state)
            }
            Action::SecureEngine => self.configure_engine(role, true, state),
            Action::RelabelEngine => {
                info!("role is now {role}, relabelling the engine");
                self.configure_engine(role, tracker.is_set(EngineSecured), state)
            }
            Action::RestartEngine => {
                self.engine().restart()?;
                Ok(Transition::retracting(&[RestartRequested]))
            }
            Action::LaunchCluster => {
                let transition = self.converge_cluster(role, tracker.is_set(EngineSecured), state)?;
                state.degraded = false;
                Ok(transition)
            }
            Action::SecureCluster | Action::PromoteManager => {
                self.converge_cluster(role, tracker.is_set(EngineSecured), state)
            }
            Action::DemoteManager => {
                info!("no longer leader, stopping the manager");
                self.orchestrator().teardown();
                let transition =
                    self.converge_cluster(role, tracker.is_set(EngineSecured), state)?;
                Ok(Transition {
                    retract: vec![ManagerRunning],
                    ..transition
                })
            }
            Action::AnnounceManager => {
                self.leadership()
                    .announce_manager(role, &self.config.manager_endpoint())?;
                Ok(Transition::asserting(&[ManagerAnnounced]))
            }
            Action::MintClientMaterial => {
                self.distribute_client_material(role)?;
                Ok(Transition::asserting(&[ClientMinted, ClientPlaced]))
            }
            Action::ReceiveClientMaterial => {
                let material = self
                    .leadership()
                    .client_material()?
                    .ok_or(CoreError::AwaitingBroadcast("client material"))?;
                self.credentials().place_client_material(&material)?;
                info!("client material received from the leader");
                Ok(Transition::asserting(&[ClientPlaced]))
            }
            Action::PackageBundle => {
                let credentials = self.credentials();
                let material = credentials.load_client_material()?;
                credentials.package_client_bundle(&material, &self.config.node.public_address)?;
                Ok(Transition::asserting(&[BundlePlaced]))
            }
        }
    }

    /// Write the daemon config for `role`. A restart is requested only when
    /// the written config differs from what the engine runs. The leader label
    /// fact tracks which role the written config carries.
    fn configure_engine(
        &self,
        role: Role,
        tls: bool,
        state: &NodeState,
    ) -> Result<Transition, CoreError> {
        let engine = self.engine();
        let desired = engine.compute_config(role, linked(state)?, tls);
        let mut transition = Transition::asserting(&[Fact::EngineConfigured]);
        if tls {
            transition = transition.and_assert(Fact::EngineSecured);
        }
        transition = if role.is_leader() {
            transition.and_assert(Fact::EngineLeaderLabel)
        } else {
            transition.and_retract(Fact::EngineLeaderLabel)
        };
        if engine.apply(&desired)? {
            transition = transition.and_assert(Fact::RestartRequested);
        }
        Ok(transition)
    }

    /// Bring the described containers up. Only roles whose rendered service
    /// changed are restarted.
    fn converge_cluster(
        &self,
        role: Role,
        tls: bool,
        state: &NodeState,
    ) -> Result<Transition, CoreError> {
        let orchestrator = self.orchestrator();
        let description = orchestrator.describe(role, linked(state)?, tls);
        let outcome = orchestrator.up(role, &description)?;
        if outcome.is_noop() {
            debug!("cluster already converged");
        }

        let mut transition = Transition::asserting(&[Fact::ClusterAvailable]);
        if tls {
            transition = transition.and_assert(Fact::ClusterSecured);
        }
        if role.is_leader() {
            transition = transition.and_assert(Fact::ManagerRunning);
        }
        Ok(transition)
    }

    /// Make the shared client material available on this leader and on the
    /// broadcast channel. Material already broadcast by an earlier leader is
    /// adopted, and material placed by an earlier attempt whose publish failed
    /// is published as is; a new issuance happens only when neither exists.
    fn distribute_client_material(&self, role: Role) -> Result<(), CoreError> {
        let leadership = self.leadership();
        let credentials = self.credentials();

        if let Some(existing) = leadership.client_material()? {
            credentials.place_client_material(&existing)?;
            info!("adopted client material already broadcast");
            return Ok(());
        }

        let material = match credentials.load_client_material() {
            Ok(placed) => {
                debug!("publishing previously placed client material");
                placed
            }
            Err(CoreError::Store(shoal_store::StoreError::NotPlaced(_))) => {
                credentials.mint_client_material(role)?
            }
            Err(e) => return Err(e),
        };
        leadership.publish_client_material(role, &material)?;
        Ok(())
    }
}
