use super::{json_pretty, EXIT_SUCCESS};
use shoal_core::parse_bench_report;
use std::io::Read;

pub fn run(file: &str, json: bool) -> Result<u8, String> {
    let output = if file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("failed to read stdin: {e}"))?;
        buf
    } else {
        std::fs::read_to_string(file).map_err(|e| format!("failed to read {file}: {e}"))?
    };
    let report = parse_bench_report(&output).map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        println!(
            "total-time:       {} {}",
            report.total_time.value, report.total_time.units
        );
        println!(
            "mean-time:        {} {}",
            report.mean_time.value, report.mean_time.units
        );
        println!("90th-percentile:  {} {}", report.p90.value, report.p90.units);
        println!("99th-percentile:  {} {}", report.p99.value, report.p99.units);
        println!(
            "composite:        {} {} ({})",
            report.composite.value, report.composite.units, report.composite.direction
        );
    }
    Ok(EXIT_SUCCESS)
}
