use crate::process::run;
use crate::RuntimeError;
use shoal_schema::DaemonConfig;
use shoal_store::write_if_changed;
use std::path::PathBuf;
use std::process::Command;
use tracing::info;

/// The local container engine service.
pub trait EngineService: Send + Sync {
    fn name(&self) -> &str;

    /// Configuration the engine currently runs with, as last written.
    fn current_config(&self) -> Result<DaemonConfig, RuntimeError>;

    /// Rewrite the engine's configuration file wholesale. Does not restart.
    fn apply_config(&self, config: &DaemonConfig) -> Result<(), RuntimeError>;

    fn restart(&self) -> Result<(), RuntimeError>;
}

/// Engine managed by systemd, configured through a defaults file carrying
/// `DOCKER_OPTS`.
pub struct SystemdEngine {
    config_file: PathBuf,
    service: String,
}

impl SystemdEngine {
    pub fn new(config_file: impl Into<PathBuf>, service: impl Into<String>) -> Self {
        Self {
            config_file: config_file.into(),
            service: service.into(),
        }
    }
}

impl EngineService for SystemdEngine {
    fn name(&self) -> &'static str {
        "systemd"
    }

    fn current_config(&self) -> Result<DaemonConfig, RuntimeError> {
        if !self.config_file.exists() {
            return Ok(DaemonConfig::new());
        }
        let content = std::fs::read_to_string(&self.config_file)?;
        DaemonConfig::parse_defaults_file(&content).map_err(|e| RuntimeError::Malformed {
            what: self.config_file.display().to_string(),
            detail: e.to_string(),
        })
    }

    fn apply_config(&self, config: &DaemonConfig) -> Result<(), RuntimeError> {
        let rendered = config
            .render_defaults_file()
            .map_err(|e| RuntimeError::Malformed {
                what: "daemon config".to_owned(),
                detail: e.to_string(),
            })?;
        write_if_changed(&self.config_file, rendered.as_bytes(), 0o644)?;
        info!("wrote engine config {}", self.config_file.display());
        Ok(())
    }

    fn restart(&self) -> Result<(), RuntimeError> {
        run(Command::new("systemctl").args(["restart", &self.service]))?;
        info!("restarted {}", self.service);
        Ok(())
    }
}
