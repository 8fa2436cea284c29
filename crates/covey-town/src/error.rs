//! Error types for the town layer.
//!
//! Most controller operations treat an unknown id as a silent no-op, so
//! this enum stays small: it covers the video provider and the boarding
//! checks that a client can trip.

use covey_protocol::{PlayerId, VehicleId};

/// Errors surfaced by town operations.
#[derive(Debug, thiserror::Error)]
pub enum TownError {
    /// The video provider could not issue a token for the joining player.
    #[error("video token request failed: {0}")]
    VideoToken(String),

    /// No player with this id is in the town.
    #[error("player {0} not found")]
    PlayerNotFound(PlayerId),

    /// No vehicle with this id is in the town.
    #[error("vehicle {0} not found")]
    VehicleNotFound(VehicleId),

    /// Every seat is taken.
    #[error("vehicle {0} is full")]
    VehicleFull(VehicleId),

    /// The driver has locked the vehicle.
    #[error("vehicle {0} is locked")]
    VehicleLocked(VehicleId),

    /// The player already occupies a seat somewhere.
    #[error("player {0} is already riding a vehicle")]
    AlreadyRiding(PlayerId),
}
