use super::{json_pretty, EXIT_SUCCESS};
use shoal_core::Controller;

pub fn run(ctl: &Controller, json: bool) -> Result<u8, String> {
    let bundle = ctl.package_bundle().map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&bundle)?);
    } else {
        let note = if bundle.written { "written" } else { "unchanged" };
        println!("bundle:  {} ({note})", bundle.archive.display());
        println!("digest:  {}", bundle.digest);
    }
    Ok(EXIT_SUCCESS)
}
