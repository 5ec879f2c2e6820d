use super::{colorize_status, EXIT_FAILURE, EXIT_SUCCESS};
use shoal_core::{shutdown_requested, Controller, DeliveryGuard};
use shoal_schema::Event;
use std::io::BufRead;
use tracing::{info, warn};

/// Deliver one event per stdin line. Blank lines and `#` comments are
/// skipped; a malformed line is reported and skipped.
///
/// A line that was read is always delivered. The shutdown flag is checked
/// after each delivery, before the next read.
pub fn run(ctl: &Controller, json: bool) -> Result<u8, String> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut delivered = 0usize;
    let mut rejected = 0usize;

    while !shutdown_requested() {
        let Some(line) = lines.next() else {
            break;
        };
        let _delivery = DeliveryGuard::enter();
        let line = line.map_err(|e| format!("failed to read stdin: {e}"))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: Event = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("skipping malformed event: {e}");
                rejected += 1;
                continue;
            }
        };

        let report = ctl.handle(&event).map_err(|e| e.to_string())?;
        if json {
            let line = serde_json::to_string(&report)
                .map_err(|e| format!("JSON serialization failed: {e}"))?;
            println!("{line}");
        } else {
            println!(
                "{}: {} [{}]",
                event.name(),
                colorize_status(&report.status),
                report.stage
            );
        }
        delivered += 1;
    }

    if shutdown_requested() {
        info!("shutdown requested, stopping");
    }
    info!("served {delivered} events, rejected {rejected}");
    Ok(if rejected == 0 {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}
