use super::{json_pretty, EXIT_SUCCESS};
use shoal_core::{Controller, Fact};

pub fn run(ctl: &Controller, json: bool) -> Result<u8, String> {
    let state = ctl.state().map_err(|e| e.to_string())?;
    let is_set = |fact: &Fact| state.facts.contains(fact.name());

    if json {
        let payload = serde_json::json!({
            "facts": Fact::ALL.iter().map(|f| serde_json::json!({
                "name": f.name(),
                "owner": f.owner(),
                "set": is_set(f),
            })).collect::<Vec<_>>(),
            "latches": state.latches,
            "degraded": state.degraded,
            "updated_at": state.updated_at,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for fact in Fact::ALL {
            let mark = if is_set(fact) {
                console::style("●").green()
            } else {
                console::style("○").dim()
            };
            println!("  {mark} {:<26} {}", fact.name(), fact.owner());
        }
        if !state.latches.is_empty() {
            let latches: Vec<&str> = state.latches.iter().map(String::as_str).collect();
            println!("\nlatched: {}", latches.join(", "));
        }
    }
    Ok(EXIT_SUCCESS)
}
