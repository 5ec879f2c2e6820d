//! Leadership Coordinator: role lookup and the leader's broadcast channel.

use crate::CoreError;
use shoal_runtime::Election;
use shoal_schema::{Role, TlsMaterial};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const MANAGER_ENDPOINT_KEY: &str = "manager_endpoint";
pub const CLIENT_CERTIFICATE_KEY: &str = "client_certificate";
pub const CLIENT_KEY_KEY: &str = "client_key";
pub const CERTIFICATE_AUTHORITY_KEY: &str = "certificate_authority";

pub struct LeadershipCoordinator<'a> {
    election: &'a dyn Election,
}

impl<'a> LeadershipCoordinator<'a> {
    pub fn new(election: &'a dyn Election) -> Self {
        Self { election }
    }

    pub fn role(&self) -> Result<Role, CoreError> {
        Ok(Role::from_leadership(self.election.is_leader()?))
    }

    /// Publish `settings` to every follower. Leader only.
    pub fn broadcast(&self, role: Role, settings: &BTreeMap<String, String>) -> Result<(), CoreError> {
        if !role.is_leader() {
            return Err(CoreError::NotLeader);
        }
        self.election.set(settings)?;
        debug!(
            "broadcast {}",
            settings.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        Ok(())
    }

    /// Current broadcast value of `key`.
    pub fn on_changed(&self, key: &str) -> Result<Option<String>, CoreError> {
        Ok(self.election.get(key)?)
    }

    pub fn announce_manager(&self, role: Role, endpoint: &str) -> Result<(), CoreError> {
        let settings = BTreeMap::from([(MANAGER_ENDPOINT_KEY.to_owned(), endpoint.to_owned())]);
        self.broadcast(role, &settings)?;
        info!("announced manager endpoint {endpoint}");
        Ok(())
    }

    pub fn manager_endpoint(&self) -> Result<Option<String>, CoreError> {
        self.on_changed(MANAGER_ENDPOINT_KEY)
    }

    pub fn publish_client_material(&self, role: Role, material: &TlsMaterial) -> Result<(), CoreError> {
        let settings = BTreeMap::from([
            (CLIENT_CERTIFICATE_KEY.to_owned(), material.certificate.clone()),
            (CLIENT_KEY_KEY.to_owned(), material.private_key.clone()),
            (
                CERTIFICATE_AUTHORITY_KEY.to_owned(),
                material.certificate_authority.clone(),
            ),
        ]);
        self.broadcast(role, &settings)
    }

    /// The shared client material, once the leader has published all of it.
    pub fn client_material(&self) -> Result<Option<TlsMaterial>, CoreError> {
        let (Some(certificate), Some(private_key), Some(certificate_authority)) = (
            self.on_changed(CLIENT_CERTIFICATE_KEY)?,
            self.on_changed(CLIENT_KEY_KEY)?,
            self.on_changed(CERTIFICATE_AUTHORITY_KEY)?,
        ) else {
            return Ok(None);
        };
        Ok(Some(TlsMaterial {
            certificate,
            private_key,
            certificate_authority,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoal_runtime::mock::ElectionBoard;
    use shoal_schema::NodeName;

    fn material() -> TlsMaterial {
        TlsMaterial {
            certificate: "CERT".to_owned(),
            private_key: "KEY".to_owned(),
            certificate_authority: "CA".to_owned(),
        }
    }

    #[test]
    fn role_follows_election() {
        let board = ElectionBoard::new();
        let n0 = NodeName::new("n0");
        let election = board.handle(n0.clone());
        let coordinator = LeadershipCoordinator::new(&election);
        assert_eq!(coordinator.role().unwrap(), Role::Follower);
        board.elect(&n0).unwrap();
        assert_eq!(coordinator.role().unwrap(), Role::Leader);
    }

    #[test]
    fn follower_cannot_broadcast() {
        let board = ElectionBoard::new();
        let election = board.handle(NodeName::new("n1"));
        let coordinator = LeadershipCoordinator::new(&election);
        assert!(matches!(
            coordinator.announce_manager(Role::Follower, "h:2377"),
            Err(CoreError::NotLeader)
        ));
        assert!(board.settings().unwrap().is_empty());
    }

    #[test]
    fn client_material_reaches_followers() {
        let board = ElectionBoard::new();
        let n0 = NodeName::new("n0");
        board.elect(&n0).unwrap();
        let leader_election = board.handle(n0);
        let follower_election = board.handle(NodeName::new("n1"));
        let leader = LeadershipCoordinator::new(&leader_election);
        let follower = LeadershipCoordinator::new(&follower_election);

        assert_eq!(follower.client_material().unwrap(), None);
        leader.publish_client_material(Role::Leader, &material()).unwrap();
        leader.publish_client_material(Role::Leader, &material()).unwrap();
        assert_eq!(follower.client_material().unwrap(), Some(material()));
    }

    #[test]
    fn partial_broadcast_is_not_material() {
        let board = ElectionBoard::new();
        let n0 = NodeName::new("n0");
        board.elect(&n0).unwrap();
        let election = board.handle(n0);
        let coordinator = LeadershipCoordinator::new(&election);
        let partial = BTreeMap::from([(CLIENT_CERTIFICATE_KEY.to_owned(), "CERT".to_owned())]);
        coordinator.broadcast(Role::Leader, &partial).unwrap();
        assert_eq!(coordinator.client_material().unwrap(), None);
    }

    #[test]
    fn manager_endpoint_is_announced() {
        let board = ElectionBoard::new();
        let n0 = NodeName::new("n0");
        board.elect(&n0).unwrap();
        let election = board.handle(n0);
        let coordinator = LeadershipCoordinator::new(&election);
        coordinator.announce_manager(Role::Leader, "203.0.113.5:2377").unwrap();
        assert_eq!(
            coordinator.manager_endpoint().unwrap().as_deref(),
            Some("203.0.113.5:2377")
        );
    }
}
