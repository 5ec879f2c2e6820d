use shoal_schema::{BackendKind, NodeConfig};
use std::fmt;
use std::process::Command;

/// A missing host tool with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check the host tools the configured system backends shell out to.
/// Mock backends need nothing. Empty list means all prerequisites are met.
pub fn check_host_prereqs(config: &NodeConfig) -> Vec<MissingPrereq> {
    check_with(config, command_exists)
}

fn check_with(config: &NodeConfig, exists: impl Fn(&str) -> bool) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();
    let system = |kind: BackendKind| kind == BackendKind::System;

    if system(config.swarm.backend) {
        if !exists("docker") {
            missing.push(MissingPrereq {
                name: "docker".to_owned(),
                purpose: "container engine and container listing",
                install_hint: "apt install docker.io | dnf install moby-engine | zypper install docker",
            });
        }
        let compose = config
            .swarm
            .compose_command
            .split_whitespace()
            .next()
            .unwrap_or("docker-compose");
        if !exists(compose) {
            missing.push(MissingPrereq {
                name: compose.to_owned(),
                purpose: "launching swarm agent and manager containers",
                install_hint: "apt install docker-compose | pip install docker-compose",
            });
        }
    }

    if system(config.engine.backend) && !exists("systemctl") {
        missing.push(MissingPrereq {
            name: "systemctl".to_owned(),
            purpose: "restarting the engine service",
            install_hint: "part of systemd (usually pre-installed)",
        });
    }

    if system(config.firewall.backend) && !exists("ufw") {
        missing.push(MissingPrereq {
            name: "ufw".to_owned(),
            purpose: "opening the cluster and manager ports",
            install_hint: "apt install ufw | dnf install ufw | zypper install ufw",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nshoal needs these tools to converge this node into the cluster.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_schema::parse_config_str;

    const CONFIG: &str = r#"
config_version = 1

[node]
name = "swarm-0"
private_address = "10.0.0.5"
public_address = "203.0.113.5"
"#;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "ufw".to_owned(),
            purpose: "opening ports",
            install_hint: "apt install ufw",
        };
        let s = format!("{m}");
        assert!(s.contains("ufw"));
        assert!(s.contains("opening ports"));
        assert!(s.contains("apt install ufw"));
    }

    #[test]
    fn all_tools_missing_on_system_backends() {
        let config = parse_config_str(CONFIG).unwrap();
        let missing = check_with(&config, |_| false);
        let names: Vec<&str> = missing.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["docker", "docker-compose", "systemctl", "ufw"]);
        assert!(format_missing(&missing).contains("missing prerequisites:"));
    }

    #[test]
    fn mock_backends_need_nothing() {
        let input = CONFIG.to_owned()
            + "[engine]\nbackend = \"mock\"\n[swarm]\nbackend = \"mock\"\n[firewall]\nbackend = \"mock\"\n";
        let config = parse_config_str(&input).unwrap();
        assert!(check_with(&config, |_| false).is_empty());
    }

    #[test]
    fn compose_plugin_checks_docker_binary() {
        let input = CONFIG.to_owned() + "[swarm]\ncompose_command = \"docker compose\"\n";
        let config = parse_config_str(&input).unwrap();
        let missing = check_with(&config, |name| name != "docker" && name != "ufw");
        let names: Vec<&str> = missing.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["docker", "docker", "ufw"]);
    }
}
