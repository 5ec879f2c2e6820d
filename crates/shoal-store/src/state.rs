use crate::layout::NodeLayout;
use crate::{write_atomic, StoreError};
use serde::{Deserialize, Serialize};
use shoal_schema::{ConnectionString, DiscoveryInfo, Role};
use std::collections::BTreeSet;
use std::fs;

/// Current state document version. Incremented on incompatible changes.
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Controller state carried between event deliveries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeState {
    pub format_version: u32,
    /// Names of asserted facts.
    #[serde(default)]
    pub facts: BTreeSet<String>,
    /// Names of rules whose guard was satisfied and acted on in an earlier pass.
    #[serde(default)]
    pub latches: BTreeSet<String>,
    /// Last discovery data delivered by the relation.
    #[serde(default)]
    pub discovery: Option<DiscoveryInfo>,
    /// Connection string of the current discovery epoch.
    #[serde(default)]
    pub connection: Option<ConnectionString>,
    /// Role from the last successful election lookup.
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default)]
    pub blocked: Option<String>,
    #[serde(default)]
    pub updated_at: String,
    /// blake3 checksum over the document without this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION,
            facts: BTreeSet::new(),
            latches: BTreeSet::new(),
            discovery: None,
            connection: None,
            role: None,
            degraded: false,
            blocked: None,
            updated_at: String::new(),
            checksum: None,
        }
    }
}

impl NodeState {
    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

pub struct StateStore {
    layout: NodeLayout,
}

impl StateStore {
    pub fn new(layout: NodeLayout) -> Self {
        Self { layout }
    }

    pub fn exists(&self) -> bool {
        self.layout.state_file().exists()
    }

    /// Load the persisted state. A node that never handled an event starts
    /// from the default (no facts asserted).
    pub fn load(&self) -> Result<NodeState, StoreError> {
        let path = self.layout.state_file();
        if !path.exists() {
            return Ok(NodeState::default());
        }
        let content = fs::read_to_string(&path)?;
        let state: NodeState = serde_json::from_str(&content)?;

        if state.format_version != STATE_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: STATE_FORMAT_VERSION,
                found: state.format_version,
            });
        }

        if let Some(ref expected) = state.checksum {
            let actual = state.compute_checksum()?;
            if actual != *expected {
                return Err(StoreError::IntegrityFailure {
                    path: path.display().to_string(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(state)
    }

    pub fn save(&self, state: &NodeState) -> Result<(), StoreError> {
        let mut stamped = state.clone();
        stamped.format_version = STATE_FORMAT_VERSION;
        stamped.updated_at = chrono::Utc::now().to_rfc3339();
        stamped.checksum = None;
        stamped.checksum = Some(stamped.compute_checksum()?);
        let content = serde_json::to_string_pretty(&stamped)?;
        write_atomic(&self.layout.state_file(), content.as_bytes(), 0o600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_schema::DiscoveryScheme;

    fn test_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = NodeLayout::new(dir.path());
        layout.initialize().unwrap();
        (dir, StateStore::new(layout))
    }

    fn sample_state() -> NodeState {
        let mut state = NodeState::default();
        state.facts.insert("discovery.available".to_owned());
        state.latches.insert("link-discovery".to_owned());
        state.connection = Some(ConnectionString::new(
            DiscoveryScheme::Consul,
            vec!["10.0.0.1:8500".to_owned()],
            false,
        ));
        state
    }

    #[test]
    fn missing_state_loads_default() {
        let (_dir, store) = test_store();
        assert!(!store.exists());
        assert_eq!(store.load().unwrap(), NodeState::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let (_dir, store) = test_store();
        store.save(&sample_state()).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.facts, sample_state().facts);
        assert_eq!(loaded.connection, sample_state().connection);
        assert!(loaded.checksum.is_some());
        assert!(!loaded.updated_at.is_empty());
    }

    #[test]
    fn tampered_state_fails_integrity() {
        let (dir, store) = test_store();
        store.save(&sample_state()).unwrap();
        let path = dir.path().join("state.json");
        let content = fs::read_to_string(&path).unwrap();
        fs::write(&path, content.replace("discovery.available", "cluster.available")).unwrap();
        assert!(matches!(
            store.load(),
            Err(StoreError::IntegrityFailure { .. })
        ));
    }

    #[test]
    fn future_format_version_is_rejected() {
        let (dir, store) = test_store();
        let mut state = NodeState::default();
        state.format_version = 99;
        fs::write(
            dir.path().join("state.json"),
            serde_json::to_string(&state).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            store.load(),
            Err(StoreError::VersionMismatch { found: 99, .. })
        ));
    }
}
