//! Vehicles and the passengers riding them.

use std::sync::atomic::{AtomicU64, Ordering};

use covey_protocol::{PlayerId, VehicleId, VehicleKind, VehicleLocation};

static NEXT_VEHICLE_ID: AtomicU64 = AtomicU64::new(1);

/// One occupied seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Passenger {
    pub player_id: PlayerId,
    pub vehicle_id: VehicleId,
    pub is_driver: bool,
}

/// A rideable vehicle.
///
/// Capacity and speed come from [`VehicleKind`]. Passengers are kept in
/// boarding order; the controller keeps exactly one driver aboard.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub id: VehicleId,
    pub kind: VehicleKind,
    pub location: VehicleLocation,
    pub lock: bool,
    pub passengers: Vec<Passenger>,
}

impl Vehicle {
    /// Creates an empty, unlocked vehicle at the default location.
    pub fn new(kind: VehicleKind) -> Self {
        Self {
            id: VehicleId(NEXT_VEHICLE_ID.fetch_add(1, Ordering::Relaxed)),
            kind,
            location: VehicleLocation::default(),
            lock: false,
            passengers: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.kind.capacity()
    }

    pub fn speed(&self) -> f64 {
        self.kind.speed()
    }

    /// The driver's id, if a driver is aboard.
    pub fn driver_id(&self) -> Option<PlayerId> {
        self.passengers
            .iter()
            .find(|p| p.is_driver)
            .map(|p| p.player_id)
    }

    pub fn is_full(&self) -> bool {
        self.passengers.len() >= self.capacity()
    }

    pub fn has_passenger(&self, player_id: PlayerId) -> bool {
        self.passengers.iter().any(|p| p.player_id == player_id)
    }

    /// Appends a seat for `player_id`. Capacity is the caller's concern.
    pub fn add_passenger(&mut self, player_id: PlayerId, is_driver: bool) {
        self.passengers.push(Passenger {
            player_id,
            vehicle_id: self.id,
            is_driver,
        });
    }

    /// Removes and returns the seat held by `player_id`.
    pub fn remove_passenger(&mut self, player_id: PlayerId) -> Option<Passenger> {
        let index = self
            .passengers
            .iter()
            .position(|p| p.player_id == player_id)?;
        Some(self.passengers.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use covey_protocol::Direction;

    use super::*;

    #[test]
    fn test_new_vehicle_defaults() {
        let vehicle = Vehicle::new(VehicleKind::Car);
        assert_eq!(vehicle.location.x, 50.0);
        assert_eq!(vehicle.location.y, 50.0);
        assert_eq!(vehicle.location.rotation, Direction::Back);
        assert!(!vehicle.location.moving);
        assert!(!vehicle.lock);
        assert!(vehicle.passengers.is_empty());
        assert_eq!(vehicle.driver_id(), None);
    }

    #[test]
    fn test_new_vehicle_ids_are_unique() {
        let a = Vehicle::new(VehicleKind::Car);
        let b = Vehicle::new(VehicleKind::Car);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_capacity_and_speed_follow_kind() {
        let dino = Vehicle::new(VehicleKind::Dinosaur);
        assert_eq!(dino.capacity(), 2);
        assert_eq!(dino.speed(), 1.5);
    }

    #[test]
    fn test_add_passenger_records_vehicle_id_and_driver() {
        let mut vehicle = Vehicle::new(VehicleKind::Car);
        vehicle.add_passenger(PlayerId(1), true);
        vehicle.add_passenger(PlayerId(2), false);

        assert_eq!(vehicle.driver_id(), Some(PlayerId(1)));
        assert!(vehicle.passengers.iter().all(|p| p.vehicle_id == vehicle.id));
        assert!(vehicle.has_passenger(PlayerId(2)));
    }

    #[test]
    fn test_is_full_at_capacity() {
        let mut board = Vehicle::new(VehicleKind::SkateBoard);
        assert!(!board.is_full());
        board.add_passenger(PlayerId(1), true);
        assert!(board.is_full());
    }

    #[test]
    fn test_remove_passenger_unknown_returns_none() {
        let mut vehicle = Vehicle::new(VehicleKind::Car);
        vehicle.add_passenger(PlayerId(1), true);
        assert!(vehicle.remove_passenger(PlayerId(5)).is_none());
        assert_eq!(vehicle.passengers.len(), 1);

        let removed = vehicle.remove_passenger(PlayerId(1)).unwrap();
        assert!(removed.is_driver);
        assert!(vehicle.passengers.is_empty());
    }
}
