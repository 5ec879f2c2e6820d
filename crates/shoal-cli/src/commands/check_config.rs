use super::{json_pretty, EXIT_SUCCESS};
use shoal_schema::parse_config_file;
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> Result<u8, String> {
    let config = parse_config_file(config_path).map_err(|e| format!("config error: {e}"))?;
    if json {
        println!("{}", json_pretty(&config)?);
    } else {
        println!("config:     {} (valid)", config_path.display());
        println!("node:       {}", config.node.name);
        println!("cluster:    {}", config.cluster_endpoint());
        println!("manager:    {}", config.manager_endpoint());
        println!("state_dir:  {}", config.state_dir.display());
        println!(
            "backends:   engine={:?} swarm={:?} leadership={:?} authority={:?} firewall={:?}",
            config.engine.backend,
            config.swarm.backend,
            config.leadership.backend,
            config.authority.backend,
            config.firewall.backend
        );
    }
    Ok(EXIT_SUCCESS)
}
