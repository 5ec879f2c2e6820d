use super::{print_report, EXIT_SUCCESS};
use shoal_core::Controller;

pub fn run(ctl: &Controller, json: bool) -> Result<u8, String> {
    let report = ctl.inspect().map_err(|e| e.to_string())?;
    print_report(&report, json)?;
    Ok(EXIT_SUCCESS)
}
