//! The town registry: every live town, keyed by id.

use std::sync::Arc;

use covey_protocol::{TownId, TownListing};
use rand::Rng;
use tokio::sync::Mutex;

use crate::{RegistryConfig, TownController};

/// A town shared between the registry and the connections inside it.
pub type SharedTown = Arc<Mutex<TownController>>;

const TOWN_ID_ALPHABET: &[u8] = b"1234567890ABCDEF";
const TOWN_ID_LEN: usize = 8;

/// Creates, lists, updates, and deletes towns.
///
/// Towns are kept in creation order, which is also listing order.
/// Administrative changes require the town's update password or the
/// configured master password.
#[derive(Debug, Default)]
pub struct TownRegistry {
    config: RegistryConfig,
    towns: Vec<(TownId, SharedTown)>,
}

impl TownRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            towns: Vec::new(),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.towns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.towns.is_empty()
    }

    /// Creates a town and returns its id and update password.
    ///
    /// Creating a town named after the configured demo id gives it that
    /// id, unless a town already holds it.
    pub fn create_town(
        &mut self,
        friendly_name: impl Into<String>,
        is_publicly_listed: bool,
    ) -> (TownId, String) {
        let friendly_name = friendly_name.into();
        let town_id = match &self.config.demo_town_id {
            Some(demo) if *demo == friendly_name && !self.contains(demo) => {
                TownId(demo.clone())
            }
            _ => self.unused_town_id(),
        };

        let controller = TownController::new(
            town_id.clone(),
            friendly_name,
            is_publicly_listed,
            self.config.town_capacity,
        );
        let password = controller.town_update_password().to_string();
        self.towns
            .push((town_id.clone(), Arc::new(Mutex::new(controller))));

        tracing::info!(%town_id, is_publicly_listed, "town created");
        (town_id, password)
    }

    pub fn get_controller_for_town(&self, town_id: &TownId) -> Option<SharedTown> {
        self.towns
            .iter()
            .find(|(id, _)| id == town_id)
            .map(|(_, town)| Arc::clone(town))
    }

    /// Lists the publicly listed towns.
    pub async fn get_towns(&self) -> Vec<TownListing> {
        let mut listings = Vec::new();
        for (_, town) in &self.towns {
            let town = town.lock().await;
            if town.is_publicly_listed() {
                listings.push(TownListing {
                    town_id: town.town_id().clone(),
                    friendly_name: town.friendly_name().to_string(),
                    current_occupancy: town.occupancy(),
                    maximum_occupancy: town.capacity(),
                });
            }
        }
        listings
    }

    /// Renames and/or re-lists a town. An empty new name is rejected and
    /// leaves the town unchanged.
    pub async fn update_town(
        &self,
        town_id: &TownId,
        password: &str,
        friendly_name: Option<String>,
        is_publicly_listed: Option<bool>,
    ) -> bool {
        let Some(town) = self.get_controller_for_town(town_id) else {
            return false;
        };
        let mut town = town.lock().await;
        if !self.password_matches(password, town.town_update_password()) {
            tracing::debug!(%town_id, "update rejected: bad password");
            return false;
        }
        if friendly_name.as_deref() == Some("") {
            return false;
        }
        if let Some(name) = friendly_name {
            town.set_friendly_name(name);
        }
        if let Some(listed) = is_publicly_listed {
            town.set_publicly_listed(listed);
        }
        true
    }

    /// Removes a town and tells everyone in it to leave.
    pub async fn delete_town(&mut self, town_id: &TownId, password: &str) -> bool {
        let Some(index) = self.towns.iter().position(|(id, _)| id == town_id)
        else {
            return false;
        };
        let town = Arc::clone(&self.towns[index].1);
        let town = town.lock().await;
        if !self.password_matches(password, town.town_update_password()) {
            tracing::debug!(%town_id, "delete rejected: bad password");
            return false;
        }
        self.towns.remove(index);
        town.disconnect_all_players();
        tracing::info!(%town_id, "town deleted");
        true
    }

    fn password_matches(&self, provided: &str, expected: &str) -> bool {
        provided == expected
            || self
                .config
                .master_password
                .as_deref()
                .is_some_and(|master| master == provided)
    }

    fn contains(&self, town_id: &str) -> bool {
        self.towns.iter().any(|(id, _)| id.as_str() == town_id)
    }

    fn unused_town_id(&self) -> TownId {
        loop {
            let candidate = generate_town_id();
            if !self.contains(&candidate) {
                return TownId(candidate);
            }
        }
    }
}

fn generate_town_id() -> String {
    let mut rng = rand::rng();
    (0..TOWN_ID_LEN)
        .map(|_| {
            let index = rng.random_range(0..TOWN_ID_ALPHABET.len());
            char::from(TOWN_ID_ALPHABET[index])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_town_id_is_8_uppercase_hex() {
        let id = generate_town_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_create_town_demo_name_uses_demo_id_once() {
        let config = RegistryConfig::default().with_demo_town_id("demoTownID");
        let mut registry = TownRegistry::new(config);

        let (first, _) = registry.create_town("demoTownID", true);
        let (second, _) = registry.create_town("demoTownID", true);

        assert_eq!(first.as_str(), "demoTownID");
        assert_ne!(second, first, "demo id is not reused");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_create_town_without_demo_config_uses_random_id() {
        let mut registry = TownRegistry::default();
        let (id, password) = registry.create_town("demoTownID", false);
        assert_eq!(id.as_str().len(), 8);
        assert_eq!(password.len(), 24);
    }
}
