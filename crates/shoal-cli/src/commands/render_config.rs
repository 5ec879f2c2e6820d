use super::{json_pretty, EXIT_SUCCESS};
use shoal_core::Controller;

pub fn run(ctl: &Controller, json: bool) -> Result<u8, String> {
    let desired = ctl.desired().map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&desired)?);
        return Ok(EXIT_SUCCESS);
    }

    let defaults = desired
        .daemon
        .render_defaults_file()
        .map_err(|e| e.to_string())?;
    let compose = desired
        .launch
        .render_compose()
        .map_err(|e| format!("JSON serialization failed: {e}"))?;
    println!("# role: {}", desired.role);
    println!("# discovery: {}\n", desired.connection);
    println!("# {}", ctl.config().engine.config_file.display());
    print!("{defaults}");
    println!("\n# {}", ctl.layout().compose_file().display());
    println!("{compose}");
    Ok(EXIT_SUCCESS)
}
