use criterion::{criterion_group, criterion_main, Criterion};
use shoal_core::{parse_bench_report, Controller};
use shoal_runtime::mock::{MemoryElection, MockAuthority, MockEngine, MockFirewall, MockLauncher};
use shoal_runtime::Backends;
use shoal_schema::{parse_config_str, ConnectionInfo, DiscoveryInfo, Event, Peer};
use shoal_store::NodeLayout;
use std::path::Path;

fn mock_controller(dir: &Path) -> Controller {
    let config = parse_config_str(&format!(
        r#"
config_version = 1
state_dir = "{}"

[node]
name = "swarm-0"
private_address = "10.0.1.10"
public_address = "203.0.113.10"
"#,
        dir.display()
    ))
    .unwrap();
    let backends = Backends {
        engine: Box::new(MockEngine::new()),
        launcher: Box::new(MockLauncher::new(
            NodeLayout::new(&config.state_dir).compose_file(),
        )),
        firewall: Box::new(MockFirewall::new()),
        election: Box::new(MemoryElection::solo(config.node.name.clone())),
        authority: Box::new(MockAuthority::new()),
    };
    Controller::new(config, backends).unwrap()
}

fn joined() -> Event {
    Event::DiscoveryJoined {
        discovery: DiscoveryInfo {
            connection: ConnectionInfo::Members {
                peers: vec![
                    Peer::new("10.0.0.1", 8500),
                    Peer::new("10.0.0.2", 8500),
                    Peer::new("10.0.0.3", 8500),
                ],
            },
            ssl: None,
        },
    }
}

fn bench_full_convergence(c: &mut Criterion) {
    c.bench_function("controller_converge_leader_tls", |b| {
        b.iter_with_setup(
            || {
                let dir = tempfile::tempdir().unwrap();
                let ctl = mock_controller(dir.path());
                ctl.handle(&Event::EngineReady).unwrap();
                ctl.handle(&Event::CaReady).unwrap();
                (dir, ctl)
            },
            |(_dir, ctl)| {
                ctl.handle(&joined()).unwrap();
            },
        );
    });
}

fn bench_converged_redelivery(c: &mut Criterion) {
    c.bench_function("controller_redeliver_converged", |b| {
        b.iter_with_setup(
            || {
                let dir = tempfile::tempdir().unwrap();
                let ctl = mock_controller(dir.path());
                for event in [Event::EngineReady, Event::CaReady, joined()] {
                    ctl.handle(&event).unwrap();
                }
                (dir, ctl)
            },
            |(_dir, ctl)| {
                ctl.handle(&Event::Update).unwrap();
            },
        );
    });
}

fn bench_report_parse(c: &mut Criterion) {
    let output = "Time taken for tests: 27.048s\n\
                  Time per container: 535.584ms [mean] | 1252.565ms [90th] | 2002.064ms [99th]\n";
    c.bench_function("bench_report_parse", |b| {
        b.iter(|| parse_bench_report(output).unwrap());
    });
}

criterion_group!(
    benches,
    bench_full_convergence,
    bench_converged_redelivery,
    bench_report_parse
);
criterion_main!(benches);
