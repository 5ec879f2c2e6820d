use super::{EXIT_FAILURE, EXIT_SUCCESS};
use shoal_core::NodeLock;
use shoal_schema::{parse_config_file, NodeConfig};
use shoal_store::{NodeLayout, StateStore};
use std::path::Path;

pub fn run(config_path: &Path, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    let config = match parse_config_file(config_path) {
        Ok(config) => {
            checks.push(Check::pass(
                "config",
                &format!("Configuration valid ({})", config_path.display()),
            ));
            config
        }
        Err(e) => {
            checks.push(Check::fail("config", &format!("Configuration invalid: {e}")));
            return print_results(&checks, false, json_output);
        }
    };

    check_prereqs(&config, &mut checks, &mut all_pass);

    let layout = NodeLayout::new(&config.state_dir);
    if layout.state_file().exists() {
        checks.push(Check::pass("state_dir", "State directory initialized"));
        check_state(&layout, &mut checks, &mut all_pass);
    } else {
        checks.push(Check::info(
            "state_dir",
            "No state yet (will be created on first delivery)",
        ));
    }

    print_results(&checks, all_pass, json_output)
}

fn check_prereqs(config: &NodeConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let missing = shoal_runtime::check_host_prereqs(config);
    if missing.is_empty() {
        checks.push(Check::pass("host_prereqs", "Host tools available"));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "host_prereqs",
            &shoal_runtime::format_missing(&missing),
        ));
    }
}

fn check_state(layout: &NodeLayout, checks: &mut Vec<Check>, all_pass: &mut bool) {
    match StateStore::new(layout.clone()).load() {
        Ok(state) => {
            checks.push(Check::pass(
                "state_integrity",
                &format!(
                    "State checksum OK ({} facts, {} latched rules)",
                    state.facts.len(),
                    state.latches.len()
                ),
            ));
            if let Some(reason) = state.blocked {
                checks.push(Check::warn(
                    "blocked",
                    &format!("Node is blocked: {reason}"),
                ));
            }
        }
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "state_integrity",
                &format!("State check failed: {e}"),
            ));
        }
    }

    match NodeLock::try_acquire(&layout.lock_file()) {
        Ok(Some(_)) => checks.push(Check::pass("node_lock", "Node lock is free")),
        Ok(None) => checks.push(Check::warn(
            "node_lock",
            "Node lock is held by another process",
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "node_lock",
                &format!("Cannot check node lock: {e}"),
            ));
        }
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Shoal Doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
