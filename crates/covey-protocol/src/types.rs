//! Data types shared by the server and its clients.
//!
//! Everything here is plain data: identities, locations, geometry, and the
//! snapshot shapes that the server broadcasts. The town crate owns the
//! mutable entities and converts them into these shapes when notifying.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player, assigned when the player joins a town.
///
/// Serialized as a plain number (`#[serde(transparent)]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub u64);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V-{}", self.0)
    }
}

/// A town identifier: a short uppercase hex code, or the configured
/// demo town name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TownId(pub String);

impl TownId {
    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TownId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TownId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

/// The way a sprite is facing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Front,
    Back,
    Left,
    Right,
}

/// Where a player is, as reported by the client.
///
/// `conversation_label` is the client's own hit-test result against the
/// rendered map. The server trusts it verbatim.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserLocation {
    pub x: f64,
    pub y: f64,
    pub rotation: Direction,
    pub moving: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_label: Option<String>,
}

/// Where a vehicle is. Same shape as [`UserLocation`] minus the
/// conversation label.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleLocation {
    pub x: f64,
    pub y: f64,
    pub rotation: Direction,
    pub moving: bool,
}

impl Default for VehicleLocation {
    fn default() -> Self {
        Self {
            x: 50.0,
            y: 50.0,
            rotation: Direction::Back,
            moving: false,
        }
    }
}

impl From<&UserLocation> for VehicleLocation {
    fn from(location: &UserLocation) -> Self {
        Self {
            x: location.x,
            y: location.y,
            rotation: location.rotation,
            moving: location.moving,
        }
    }
}

/// Riders take the vehicle's position and leave any conversation area.
impl From<&VehicleLocation> for UserLocation {
    fn from(location: &VehicleLocation) -> Self {
        Self {
            x: location.x,
            y: location.y,
            rotation: location.rotation,
            moving: location.moving,
            conversation_label: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation areas
// ---------------------------------------------------------------------------

/// An axis-aligned rectangle anchored at its centre point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    fn left(&self) -> f64 {
        self.x - self.width / 2.0
    }

    fn right(&self) -> f64 {
        self.x + self.width / 2.0
    }

    fn top(&self) -> f64 {
        self.y - self.height / 2.0
    }

    fn bottom(&self) -> f64 {
        self.y + self.height / 2.0
    }

    /// Returns `true` if the two boxes share any area. Boxes that only
    /// touch along an edge do not overlap.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        let apart = self.left() >= other.right()
            || other.left() >= self.right()
            || self.top() >= other.bottom()
            || other.top() >= self.bottom();
        !apart
    }

    /// Returns `true` if the point lies strictly inside the box.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x > self.left() && x < self.right() && y > self.top() && y < self.bottom()
    }
}

/// A labelled zone that groups the players standing in it.
///
/// Clients send this shape to create an area (`occupants_by_id` is
/// ignored and may be omitted); the server broadcasts it on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationArea {
    pub label: String,
    pub topic: String,
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub occupants_by_id: Vec<PlayerId>,
}

// ---------------------------------------------------------------------------
// Vehicles
// ---------------------------------------------------------------------------

/// The closed set of rideable vehicles.
///
/// Variants differ only in their constants, so there is one tag and a
/// lookup table instead of a type per vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleKind {
    Car,
    Dinosaur,
    SkateBoard,
}

impl VehicleKind {
    /// Maximum number of passengers, driver included.
    pub fn capacity(self) -> usize {
        match self {
            Self::Car => 4,
            Self::Dinosaur => 2,
            Self::SkateBoard => 1,
        }
    }

    /// Speed multiplier relative to a walking player.
    pub fn speed(self) -> f64 {
        match self {
            Self::Car => 2.0,
            Self::Dinosaur => 1.5,
            Self::SkateBoard => 1.2,
        }
    }

    /// Parses the kind names clients send. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Car" => Some(Self::Car),
            "Dinosaur" => Some(Self::Dinosaur),
            "SkateBoard" => Some(Self::SkateBoard),
            _ => None,
        }
    }
}

impl fmt::Display for VehicleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Car => write!(f, "Car"),
            Self::Dinosaur => write!(f, "Dinosaur"),
            Self::SkateBoard => write!(f, "SkateBoard"),
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// A player as other clients see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub user_name: String,
    pub location: UserLocation,
    pub visible: bool,
}

/// One seat in a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerInfo {
    pub player_id: PlayerId,
    pub user_name: String,
    pub is_driver: bool,
}

/// A vehicle as other clients see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub id: VehicleId,
    pub kind: VehicleKind,
    pub capacity: usize,
    pub speed: f64,
    pub location: VehicleLocation,
    pub lock: bool,
    pub passengers: Vec<PassengerInfo>,
}

/// One row of the public town listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TownListing {
    pub town_id: TownId,
    pub friendly_name: String,
    pub current_occupancy: usize,
    pub maximum_occupancy: usize,
}

/// A chat line relayed to everyone in the town.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub author: PlayerId,
    pub body: String,
    /// Milliseconds since the Unix epoch, stamped by the server.
    pub date_created: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f64, y: f64, width: f64, height: f64) -> BoundingBox {
        BoundingBox { x, y, width, height }
    }

    #[test]
    fn test_player_id_serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&PlayerId(42)).unwrap(), "42");
        assert_eq!(PlayerId(7).to_string(), "P-7");
    }

    #[test]
    fn test_town_id_serializes_as_plain_string() {
        let id = TownId::from("0A1B2C3D");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"0A1B2C3D\"");
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Direction::Back).unwrap(),
            "\"back\""
        );
    }

    #[test]
    fn test_user_location_missing_label_defaults_to_none() {
        let json = r#"{"x": 1, "y": 2, "rotation": "left", "moving": false}"#;
        let location: UserLocation = serde_json::from_str(json).unwrap();
        assert_eq!(location.conversation_label, None);
        assert_eq!(location.rotation, Direction::Left);
    }

    #[test]
    fn test_vehicle_location_into_user_location_drops_label() {
        let vehicle = VehicleLocation {
            x: 3.0,
            y: 4.0,
            rotation: Direction::Right,
            moving: true,
        };
        let user = UserLocation::from(&vehicle);
        assert_eq!((user.x, user.y), (3.0, 4.0));
        assert!(user.moving);
        assert_eq!(user.conversation_label, None);
    }

    #[test]
    fn test_overlaps_shared_area_returns_true() {
        let a = bbox(10.0, 10.0, 5.0, 5.0);
        let b = bbox(12.0, 12.0, 5.0, 5.0);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn test_overlaps_touching_edges_returns_false() {
        // a spans x 7.5..12.5, b spans x 12.5..17.5
        let a = bbox(10.0, 10.0, 5.0, 5.0);
        let b = bbox(15.0, 10.0, 5.0, 5.0);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_overlaps_contained_box_returns_true() {
        let outer = bbox(0.0, 0.0, 100.0, 100.0);
        let inner = bbox(1.0, 1.0, 2.0, 2.0);
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn test_contains_is_strict() {
        let area = bbox(10.0, 10.0, 5.0, 5.0);
        assert!(area.contains(10.0, 10.0));
        assert!(!area.contains(7.5, 10.0), "edge is outside");
        assert!(!area.contains(25.0, 25.0));
    }

    #[test]
    fn test_vehicle_kind_table_golden_values() {
        assert_eq!(VehicleKind::Car.capacity(), 4);
        assert_eq!(VehicleKind::Car.speed(), 2.0);
        assert_eq!(VehicleKind::Dinosaur.capacity(), 2);
        assert_eq!(VehicleKind::Dinosaur.speed(), 1.5);
        assert_eq!(VehicleKind::SkateBoard.capacity(), 1);
        assert_eq!(VehicleKind::SkateBoard.speed(), 1.2);
    }

    #[test]
    fn test_vehicle_kind_parse_is_case_sensitive() {
        assert_eq!(VehicleKind::parse("SkateBoard"), Some(VehicleKind::SkateBoard));
        assert_eq!(VehicleKind::parse("car"), None);
        assert_eq!(VehicleKind::parse("Spaceship"), None);
    }

    #[test]
    fn test_conversation_area_occupants_default_empty() {
        let json = r#"{
            "label": "A1",
            "topic": "lunch",
            "bounding_box": {"x": 10, "y": 10, "width": 5, "height": 5}
        }"#;
        let area: ConversationArea = serde_json::from_str(json).unwrap();
        assert!(area.occupants_by_id.is_empty());
    }
}
