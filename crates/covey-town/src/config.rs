//! Registry configuration.

use serde::{Deserialize, Serialize};

/// Maximum occupancy reported for every town.
pub const DEFAULT_TOWN_CAPACITY: usize = 50;

/// Settings shared by every town a [`TownRegistry`](crate::TownRegistry)
/// creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Capacity given to new towns.
    pub town_capacity: usize,

    /// A friendly name that, when used to create a town, also becomes
    /// that town's id. Lets a well-known demo town live at a fixed URL.
    pub demo_town_id: Option<String>,

    /// A password accepted for updating or deleting any town.
    pub master_password: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            town_capacity: DEFAULT_TOWN_CAPACITY,
            demo_town_id: None,
            master_password: None,
        }
    }
}

impl RegistryConfig {
    /// Reads `COVEY_DEMO_TOWN_ID` and `COVEY_MASTER_TOWN_PASSWORD`.
    /// Unset or empty variables leave the default in place.
    pub fn from_env() -> Self {
        Self {
            demo_town_id: non_empty_var("COVEY_DEMO_TOWN_ID"),
            master_password: non_empty_var("COVEY_MASTER_TOWN_PASSWORD"),
            ..Self::default()
        }
    }

    pub fn with_demo_town_id(mut self, id: impl Into<String>) -> Self {
        self.demo_town_id = Some(id.into());
        self
    }

    pub fn with_master_password(mut self, password: impl Into<String>) -> Self {
        self.master_password = Some(password.into());
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_config_default() {
        let config = RegistryConfig::default();
        assert_eq!(config.town_capacity, 50);
        assert!(config.demo_town_id.is_none());
        assert!(config.master_password.is_none());
    }

    #[test]
    fn test_registry_config_builders_set_fields() {
        let config = RegistryConfig::default()
            .with_demo_town_id("demoTownID")
            .with_master_password("root");
        assert_eq!(config.demo_town_id.as_deref(), Some("demoTownID"));
        assert_eq!(config.master_password.as_deref(), Some("root"));
    }
}
