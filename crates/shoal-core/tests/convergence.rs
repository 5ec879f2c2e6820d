use shoal_core::{Controller, ErrorClass, Stage, Status, WaitingOn};
use shoal_runtime::mock::{ElectionBoard, MockAuthority, MockEngine, MockFirewall, MockLauncher};
use shoal_runtime::{Backends, EngineService, Launcher};
use shoal_schema::{
    parse_config_str, ConnectionInfo, ContainerRole, DiscoveryInfo, Event, MaterialRole,
    NodeName, Peer,
};
use shoal_store::NodeLayout;
use std::collections::BTreeSet;
use std::fs;

struct Node {
    _dir: tempfile::TempDir,
    ctl: Controller,
    engine: MockEngine,
    launcher: MockLauncher,
    firewall: MockFirewall,
    authority: MockAuthority,
}

fn node(board: &ElectionBoard, name: &str, host: u8) -> Node {
    let dir = tempfile::tempdir().unwrap();
    let config = parse_config_str(&format!(
        r#"
config_version = 1
state_dir = "{}"

[node]
name = "{name}"
private_address = "10.0.1.{host}"
public_address = "203.0.113.{host}"
"#,
        dir.path().display()
    ))
    .unwrap();

    let engine = MockEngine::new();
    let launcher = MockLauncher::new(NodeLayout::new(&config.state_dir).compose_file());
    let firewall = MockFirewall::new();
    let authority = MockAuthority::new();
    let backends = Backends {
        engine: Box::new(engine.clone()),
        launcher: Box::new(launcher.clone()),
        firewall: Box::new(firewall.clone()),
        election: Box::new(board.handle(NodeName::new(name))),
        authority: Box::new(authority.clone()),
    };
    Node {
        ctl: Controller::new(config, backends).unwrap(),
        _dir: dir,
        engine,
        launcher,
        firewall,
        authority,
    }
}

fn leader(board: &ElectionBoard, name: &str, host: u8) -> Node {
    board.elect(&NodeName::new(name)).unwrap();
    node(board, name, host)
}

fn consul(peers: &[(&str, u16)]) -> Event {
    Event::DiscoveryJoined {
        discovery: DiscoveryInfo {
            connection: ConnectionInfo::Members {
                peers: peers.iter().map(|(a, p)| Peer::new(*a, *p)).collect(),
            },
            ssl: None,
        },
    }
}

fn three_peers() -> Event {
    consul(&[("10.0.0.1", 8500), ("10.0.0.2", 8500), ("10.0.0.3", 8500)])
}

/// Engine up, discovery joined, CA ready.
fn converge(node: &Node) {
    node.ctl.handle(&Event::EngineReady).unwrap();
    node.ctl.handle(&three_peers()).unwrap();
    node.ctl.handle(&Event::CaReady).unwrap();
}

#[test]
fn three_peer_consul_leader_without_tls() {
    let board = ElectionBoard::new();
    let n = leader(&board, "swarm-0", 10);

    n.ctl.handle(&Event::EngineReady).unwrap();
    let report = n.ctl.handle(&three_peers()).unwrap();

    let desired = n.ctl.desired().unwrap();
    assert_eq!(
        desired.connection.to_string(),
        "consul://10.0.0.1:8500,10.0.0.2:8500,10.0.0.3:8500"
    );
    assert!(desired.launch.includes(ContainerRole::Manager));
    assert!(desired.launch.includes(ContainerRole::Agent));
    assert!(!desired.daemon.contains("tlsverify"));

    assert_eq!(report.stage, Stage::ClusterUp);
    assert_eq!(report.status, Status::Blocked(WaitingOn::CertificateAuthority));
    assert_eq!(
        n.launcher.started().unwrap(),
        vec![ContainerRole::Manager, ContainerRole::Agent]
    );
    assert_eq!(n.firewall.opened().unwrap(), BTreeSet::from([2376, 2377]));
    assert_eq!(
        board.settings().unwrap().get("manager_endpoint").map(String::as_str),
        Some("203.0.113.10:2377")
    );
}

#[test]
fn leader_with_authority_reaches_bundle() {
    let board = ElectionBoard::new();
    let n = leader(&board, "swarm-0", 10);
    n.ctl.handle(&Event::EngineReady).unwrap();
    n.ctl.handle(&three_peers()).unwrap();

    let report = n.ctl.handle(&Event::CaReady).unwrap();
    assert_eq!(
        report.fired,
        vec![
            "issue-server-material",
            "secure-engine",
            "restart-engine",
            "secure-cluster",
            "mint-client-material",
            "package-bundle",
        ]
    );
    assert_eq!(report.stage, Stage::BundlePlaced);
    assert_eq!(report.status, Status::ActiveLeader);

    // Only the manager carries TLS flags, so only it is restarted.
    assert_eq!(
        n.launcher.started().unwrap(),
        vec![
            ContainerRole::Manager,
            ContainerRole::Agent,
            ContainerRole::Manager
        ]
    );
    assert!(n.ctl.desired().unwrap().daemon.contains("tlsverify"));
    assert_eq!(n.authority.issued(MaterialRole::Client).unwrap(), 1);
    assert!(board.settings().unwrap().contains_key("client_certificate"));
}

#[test]
fn follower_never_runs_manager_and_waits_for_credentials() {
    let board = ElectionBoard::new();
    let lead = leader(&board, "swarm-0", 10);
    let follower = node(&board, "swarm-1", 11);

    follower.ctl.handle(&Event::EngineReady).unwrap();
    let report = follower.ctl.handle(&three_peers()).unwrap();
    assert_eq!(report.status, Status::Blocked(WaitingOn::LeaderCredentials));
    let failure = &report.failures[0];
    assert_eq!(failure.rule, "receive-client-material");
    assert_eq!(failure.class, ErrorClass::Transient);
    assert_eq!(follower.launcher.started().unwrap(), vec![ContainerRole::Agent]);
    assert_eq!(follower.firewall.opened().unwrap(), BTreeSet::from([2376]));
    assert!(!follower
        .ctl
        .desired()
        .unwrap()
        .launch
        .includes(ContainerRole::Manager));

    converge(&lead);
    let report = follower.ctl.handle(&Event::BroadcastChanged).unwrap();
    assert_eq!(
        report.fired,
        vec!["receive-client-material", "package-bundle"]
    );
    assert_eq!(report.status, Status::ActiveFollower);
    assert_eq!(report.stage, Stage::BundlePlaced);

    let key = |n: &Node| {
        fs::read(n.ctl.layout().bundle_root().join("swarm_credentials/key.pem")).unwrap()
    };
    assert_eq!(key(&follower), key(&lead));
    assert_eq!(follower.authority.issued(MaterialRole::Client).unwrap(), 0);
}

#[test]
fn teardown_then_recovery_without_reminting() {
    let board = ElectionBoard::new();
    let n = leader(&board, "swarm-0", 10);
    converge(&n);
    let connection = n.ctl.state().unwrap().connection;
    let restarts = n.engine.restarts().unwrap();

    let report = n.ctl.handle(&Event::DiscoveryDeparted).unwrap();
    assert_eq!(
        report.fired,
        vec![
            "unlink-discovery",
            "teardown-cluster",
            "reset-engine",
            "withdraw-manager"
        ]
    );
    assert_eq!(report.stage, Stage::NoDiscovery);
    assert_eq!(report.status, Status::DegradedReconfiguring);
    assert_eq!(n.launcher.kills().unwrap(), 1);
    assert_eq!(n.launcher.removes().unwrap(), 1);
    assert!(n.launcher.running().unwrap().is_empty());

    let again = n.ctl.handle(&Event::DiscoveryDeparted).unwrap();
    assert!(again.fired.is_empty());
    assert_eq!(n.launcher.kills().unwrap(), 1);
    assert_eq!(n.launcher.removes().unwrap(), 1);

    let report = n.ctl.handle(&three_peers()).unwrap();
    assert_eq!(n.ctl.state().unwrap().connection, connection);
    assert_eq!(report.stage, Stage::BundlePlaced);
    assert_eq!(report.status, Status::ActiveLeader);
    assert!(!report.fired.contains(&"mint-client-material"));
    assert_eq!(n.authority.issued(MaterialRole::Client).unwrap(), 1);
    // Same connection, same config: nothing to restart.
    assert_eq!(n.engine.restarts().unwrap(), restarts);
}

#[test]
fn engine_restarts_once_per_config_change() {
    let board = ElectionBoard::new();
    let n = leader(&board, "swarm-0", 10);
    converge(&n);
    // Initial config, then the TLS flags.
    assert_eq!(n.engine.applies().unwrap(), 2);
    assert_eq!(n.engine.restarts().unwrap(), 2);

    for event in [
        Event::EngineReady,
        three_peers(),
        Event::CaReady,
        Event::Update,
    ] {
        n.ctl.handle(&event).unwrap();
    }
    assert_eq!(n.engine.applies().unwrap(), 2);
    assert_eq!(n.engine.restarts().unwrap(), 2);
}

#[test]
fn restart_waits_for_the_engine() {
    let board = ElectionBoard::new();
    let n = leader(&board, "swarm-0", 10);
    n.ctl.handle(&Event::EngineReady).unwrap();
    n.ctl.handle(&three_peers()).unwrap();
    n.ctl.handle(&Event::EngineStopped).unwrap();

    let report = n.ctl.handle(&Event::CaReady).unwrap();
    assert!(report.fired.contains(&"secure-engine"));
    assert!(!report.fired.contains(&"restart-engine"));
    assert_eq!(n.engine.restarts().unwrap(), 1);

    let report = n.ctl.handle(&Event::EngineReady).unwrap();
    assert_eq!(report.fired[..2], ["restart-engine", "secure-cluster"]);
    assert_eq!(n.engine.restarts().unwrap(), 2);
}

#[test]
fn converged_cluster_is_not_restarted() {
    let board = ElectionBoard::new();
    let n = leader(&board, "swarm-0", 10);
    converge(&n);
    let started = n.launcher.started().unwrap().len();

    n.ctl.handle(&Event::Update).unwrap();
    n.ctl.handle(&Event::LeadershipChanged).unwrap();
    assert_eq!(n.launcher.started().unwrap().len(), started);
}

#[test]
fn bundle_repackaging_writes_nothing() {
    let board = ElectionBoard::new();
    let n = leader(&board, "swarm-0", 10);
    converge(&n);

    let archive = n.ctl.layout().bundle_root().join("swarm_credentials.tar.gz");
    let bytes = fs::read(&archive).unwrap();
    let modified = fs::metadata(&archive).unwrap().modified().unwrap();

    let bundle = n.ctl.package_bundle().unwrap();
    assert!(!bundle.written);
    assert_eq!(bundle.archive, archive);
    assert_eq!(fs::read(&archive).unwrap(), bytes);
    assert_eq!(fs::metadata(&archive).unwrap().modified().unwrap(), modified);
}

#[test]
fn every_event_is_idempotent_on_redelivery() {
    let board = ElectionBoard::new();
    let n = leader(&board, "swarm-0", 10);

    for event in [
        Event::EngineReady,
        three_peers(),
        Event::CaReady,
        Event::BroadcastChanged,
        Event::LeadershipChanged,
        Event::Update,
        Event::EngineStopped,
        Event::EngineReady,
        Event::DiscoveryDeparted,
    ] {
        let first = n.ctl.handle(&event).unwrap();
        let second = n.ctl.handle(&event).unwrap();
        assert!(
            second.fired.is_empty(),
            "{} fired {:?} on redelivery",
            event.name(),
            second.fired
        );
        assert!(second.failures.is_empty());
        assert_eq!(first.stage, second.stage);
        assert_eq!(first.status, second.status);
    }
    assert_eq!(n.launcher.kills().unwrap(), 1);
    assert_eq!(n.authority.issued(MaterialRole::Server).unwrap(), 1);
}

#[test]
fn empty_membership_blocks_until_fixed() {
    let board = ElectionBoard::new();
    let n = leader(&board, "swarm-0", 10);
    n.ctl.handle(&Event::EngineReady).unwrap();

    let report = n.ctl.handle(&consul(&[])).unwrap();
    assert_eq!(report.stage, Stage::NoDiscovery);
    assert_eq!(report.failures[0].rule, "link-discovery");
    assert_eq!(report.failures[0].class, ErrorClass::Malformed);
    assert!(matches!(
        report.status,
        Status::Blocked(WaitingOn::Configuration(_))
    ));
    assert!(n.ctl.state().unwrap().connection.is_none());

    // Still blocked on plain redelivery.
    let report = n.ctl.handle(&Event::Update).unwrap();
    assert!(matches!(
        report.status,
        Status::Blocked(WaitingOn::Configuration(_))
    ));

    let report = n.ctl.handle(&consul(&[("10.0.0.1", 8500)])).unwrap();
    assert!(report.failures.is_empty());
    assert_eq!(report.stage, Stage::ClusterUp);
}

#[test]
fn authority_not_ready_is_retried() {
    let board = ElectionBoard::new();
    let n = leader(&board, "swarm-0", 10);
    n.authority.set_ready(false).unwrap();
    n.ctl.handle(&Event::EngineReady).unwrap();
    n.ctl.handle(&three_peers()).unwrap();

    let report = n.ctl.handle(&Event::CaReady).unwrap();
    let rules: Vec<_> = report.failures.iter().map(|f| f.rule).collect();
    assert_eq!(rules, vec!["issue-server-material", "mint-client-material"]);
    assert!(report
        .failures
        .iter()
        .all(|f| f.class == ErrorClass::Transient));
    assert!(!n.ctl.layout().server_cert().exists());

    n.authority.set_ready(true).unwrap();
    let report = n.ctl.handle(&Event::Update).unwrap();
    assert!(report.failures.is_empty());
    assert!(report.fired.contains(&"issue-server-material"));
    assert_eq!(report.stage, Stage::BundlePlaced);
}

#[test]
fn failover_moves_the_manager_and_adopts_client_material() {
    let board = ElectionBoard::new();
    let a = leader(&board, "swarm-0", 10);
    let b = node(&board, "swarm-1", 11);
    converge(&a);
    converge(&b);
    b.ctl.handle(&Event::BroadcastChanged).unwrap();
    let label = |n: &Node| {
        n.engine.current_config().unwrap().values("label").join(",")
    };
    assert_eq!(label(&a), "swarm.role=leader");
    assert_eq!(label(&b), "swarm.role=follower");
    let (a_restarts, b_restarts) = (a.engine.restarts().unwrap(), b.engine.restarts().unwrap());

    board.elect(&NodeName::new("swarm-1")).unwrap();
    let promoted = b.ctl.handle(&Event::LeadershipChanged).unwrap();
    assert_eq!(
        promoted.fired,
        vec![
            "label-engine-leader",
            "restart-engine",
            "promote-manager",
            "announce-manager",
            "mint-client-material"
        ]
    );
    assert_eq!(label(&b), "swarm.role=leader");
    assert_eq!(b.engine.restarts().unwrap(), b_restarts + 1);
    assert_eq!(promoted.status, Status::ActiveLeader);
    assert_eq!(b.authority.issued(MaterialRole::Client).unwrap(), 0);
    assert_eq!(
        board.settings().unwrap().get("manager_endpoint").map(String::as_str),
        Some("203.0.113.11:2377")
    );

    let demoted = a.ctl.handle(&Event::LeadershipChanged).unwrap();
    assert_eq!(
        demoted.fired,
        vec![
            "label-engine-follower",
            "restart-engine",
            "demote-manager",
            "withdraw-manager"
        ]
    );
    assert_eq!(demoted.status, Status::ActiveFollower);
    assert_eq!(label(&a), "swarm.role=follower");
    assert_eq!(a.engine.restarts().unwrap(), a_restarts + 1);
    assert_eq!(
        a.ctl.desired().unwrap().daemon.values("label"),
        vec!["swarm.role=follower"]
    );
    let running: Vec<_> = a
        .launcher
        .running()
        .unwrap()
        .into_iter()
        .map(|c| c.role)
        .collect();
    assert_eq!(running, vec![ContainerRole::Agent]);
}

#[test]
fn unreachable_election_holds_the_leader_in_place() {
    let board = ElectionBoard::new();
    let n = leader(&board, "swarm-0", 10);
    converge(&n);
    let restarts = n.engine.restarts().unwrap();

    board.set_offline(true);
    let report = n.ctl.handle(&Event::Update).unwrap();
    assert!(report.fired.is_empty(), "fired {:?}", report.fired);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].rule, "resolve-role");
    assert_eq!(report.failures[0].class, ErrorClass::Transient);
    assert_eq!(report.status, Status::ActiveLeader);
    assert_eq!(report.stage, Stage::BundlePlaced);
    assert_eq!(n.launcher.kills().unwrap(), 0);
    let running: Vec<_> = n
        .launcher
        .running()
        .unwrap()
        .into_iter()
        .map(|c| c.role)
        .collect();
    assert!(running.contains(&ContainerRole::Manager));
    assert_eq!(n.engine.restarts().unwrap(), restarts);

    board.set_offline(false);
    let report = n.ctl.handle(&Event::Update).unwrap();
    assert!(report.fired.is_empty(), "fired {:?}", report.fired);
    assert!(report.failures.is_empty());
    assert_eq!(
        board.settings().unwrap().get("manager_endpoint").map(String::as_str),
        Some("203.0.113.10:2377")
    );
}
