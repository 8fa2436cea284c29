//! Players: the people walking around a town.

use std::sync::atomic::{AtomicU64, Ordering};

use covey_protocol::{BoundingBox, PlayerId, PlayerInfo, UserLocation};

static NEXT_PLAYER_ID: AtomicU64 = AtomicU64::new(1);

/// A player inside one town.
///
/// `active_conversation_area` names the area the player is in by label.
/// The controller owns the area itself; this is only a back-reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub user_name: String,
    pub location: UserLocation,
    pub visible: bool,
    pub active_conversation_area: Option<String>,
}

impl Player {
    /// Creates a visible player at the origin with a fresh id.
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            id: PlayerId(NEXT_PLAYER_ID.fetch_add(1, Ordering::Relaxed)),
            user_name: user_name.into(),
            location: UserLocation::default(),
            visible: true,
            active_conversation_area: None,
        }
    }

    /// Returns `true` if the player's position lies strictly inside `area`.
    pub fn is_within(&self, area: &BoundingBox) -> bool {
        area.contains(self.location.x, self.location.y)
    }
}

impl From<&Player> for PlayerInfo {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            user_name: player.user_name.clone(),
            location: player.location.clone(),
            visible: player.visible,
        }
    }
}
