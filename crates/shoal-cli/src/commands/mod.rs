pub mod bench_report;
pub mod bundle;
pub mod check_config;
pub mod deliver;
pub mod doctor;
pub mod facts;
pub mod render_config;
pub mod serve;
pub mod status;

use indicatif::{ProgressBar, ProgressStyle};
use shoal_core::{Report, Status};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✗ {msg}"));
}

pub fn colorize_status(status: &Status) -> String {
    use console::Style;
    let text = status.to_string();
    match status {
        Status::ActiveLeader | Status::ActiveFollower => {
            Style::new().green().apply_to(text).to_string()
        }
        Status::Initializing => Style::new().cyan().apply_to(text).to_string(),
        Status::Blocked(_) => Style::new().yellow().apply_to(text).to_string(),
        Status::DegradedReconfiguring => Style::new().red().bold().apply_to(text).to_string(),
    }
}

pub fn print_report(report: &Report, json: bool) -> Result<(), String> {
    if json {
        println!("{}", json_pretty(report)?);
        return Ok(());
    }
    println!("status: {}", colorize_status(&report.status));
    println!("stage:  {}", report.stage);
    println!("role:   {}", report.role);
    if !report.fired.is_empty() {
        println!("fired:  {}", report.fired.join(", "));
    }
    for failure in &report.failures {
        println!(
            "  {} {} ({}): {}",
            console::style("!").yellow(),
            failure.rule,
            failure.class,
            failure.message
        );
    }
    Ok(())
}
