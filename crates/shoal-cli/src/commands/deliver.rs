use super::{print_report, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use shoal_core::{Controller, DeliveryGuard};
use shoal_schema::Event;

/// Parse an event given inline or as `@path`.
pub fn parse_event(arg: &str) -> Result<Event, String> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read event file {path}: {e}"))?,
        None => arg.to_owned(),
    };
    serde_json::from_str(&text).map_err(|e| format!("invalid event: {e}"))
}

pub fn run(ctl: &Controller, arg: &str, json: bool) -> Result<u8, String> {
    let event = parse_event(arg)?;

    let pb = if json || !console::user_attended_stderr() {
        None
    } else {
        Some(spinner(&format!("delivering {}...", event.name())))
    };
    let delivery = DeliveryGuard::enter();
    let outcome = ctl.handle(&event);
    drop(delivery);
    let report = match outcome {
        Ok(report) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("{} delivered", event.name()));
            }
            report
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "delivery failed");
            }
            return Err(e.to_string());
        }
    };
    print_report(&report, json)?;
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_event() {
        assert_eq!(parse_event(r#"{"event":"update"}"#).unwrap(), Event::Update);
    }

    #[test]
    fn event_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.json");
        std::fs::write(&path, r#"{"event":"engine-ready"}"#).unwrap();
        let event = parse_event(&format!("@{}", path.display())).unwrap();
        assert_eq!(event, Event::EngineReady);
    }

    #[test]
    fn rejects_unknown_events() {
        let err = parse_event(r#"{"event":"reboot"}"#).unwrap_err();
        assert!(err.starts_with("invalid event"));
    }
}
