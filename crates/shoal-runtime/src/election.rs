use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use shoal_schema::NodeName;
use shoal_store::write_if_changed;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// External leadership primitive plus the leader's broadcast settings.
///
/// Settings are single-writer (the leader) and multi-reader (followers).
pub trait Election: Send + Sync {
    fn is_leader(&self) -> Result<bool, RuntimeError>;

    /// Merge `settings` into the broadcast. Fails with
    /// [`RuntimeError::NotLeader`] on followers.
    fn set(&self, settings: &BTreeMap<String, String>) -> Result<(), RuntimeError>;

    fn get(&self, key: &str) -> Result<Option<String>, RuntimeError>;
}

/// Shared leader-settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderSettings {
    /// Name of the node the election resolved as leader.
    #[serde(default)]
    pub leader: Option<NodeName>,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

/// Election backed by a leader-settings document the election tooling keeps
/// on shared storage.
pub struct FileElection {
    settings_file: PathBuf,
    node: NodeName,
}

impl FileElection {
    pub fn new(settings_file: impl Into<PathBuf>, node: NodeName) -> Self {
        Self {
            settings_file: settings_file.into(),
            node,
        }
    }

    fn read(&self) -> Result<LeaderSettings, RuntimeError> {
        if !self.settings_file.exists() {
            return Ok(LeaderSettings::default());
        }
        let content = std::fs::read_to_string(&self.settings_file)?;
        serde_json::from_str(&content).map_err(|e| RuntimeError::Malformed {
            what: self.settings_file.display().to_string(),
            detail: e.to_string(),
        })
    }
}

impl Election for FileElection {
    fn is_leader(&self) -> Result<bool, RuntimeError> {
        Ok(self.read()?.leader.as_ref() == Some(&self.node))
    }

    fn set(&self, settings: &BTreeMap<String, String>) -> Result<(), RuntimeError> {
        let mut doc = self.read()?;
        if doc.leader.as_ref() != Some(&self.node) {
            return Err(RuntimeError::NotLeader);
        }
        doc.settings
            .extend(settings.iter().map(|(k, v)| (k.clone(), v.clone())));
        let content = serde_json::to_string_pretty(&doc)?;
        let changed = write_if_changed(&self.settings_file, content.as_bytes(), 0o644)?;
        debug!("leader settings updated (changed: {changed})");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, RuntimeError> {
        Ok(self.read()?.settings.get(key).cloned())
    }
}
