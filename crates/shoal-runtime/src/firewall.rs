use crate::process::run;
use crate::RuntimeError;
use std::process::Command;
use tracing::info;

pub trait Firewall: Send + Sync {
    /// Allow inbound TCP on `port`. Opening an already open port succeeds.
    fn open_port(&self, port: u16) -> Result<(), RuntimeError>;
}

/// Host firewall managed through `ufw`.
#[derive(Debug, Default)]
pub struct UfwFirewall;

impl Firewall for UfwFirewall {
    fn open_port(&self, port: u16) -> Result<(), RuntimeError> {
        run(Command::new("ufw").args(["allow", &format!("{port}/tcp")]))?;
        info!("opened port {port}/tcp");
        Ok(())
    }
}
