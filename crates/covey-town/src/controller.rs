//! The per-town session controller.
//!
//! A [`TownController`] owns everything that exists inside one town:
//! players and their sessions, conversation areas, vehicles, and the
//! listeners subscribed to the town's events. Every mutation happens
//! through a method here, and every method that changes visible state
//! notifies the listeners before returning.
//!
//! Entities refer to each other by id. An id that no longer resolves is a
//! referential miss and the operation is a silent no-op, since clients
//! routinely race each other (two players destroying the same vehicle,
//! a move arriving after a disconnect).

use std::sync::Arc;

use covey_protocol::{
    ChatMessage, ConversationArea, PassengerInfo, PlayerId, PlayerInfo,
    TownId, UserLocation, VehicleId, VehicleInfo, VehicleKind,
    VehicleLocation,
};

use crate::session::generate_password;
use crate::{
    ListenerId, Listeners, Player, PlayerSession, TownError, TownListener,
    Vehicle, VideoClient,
};

/// State and rules for one town.
#[derive(Debug)]
pub struct TownController {
    town_id: TownId,
    friendly_name: String,
    is_publicly_listed: bool,
    capacity: usize,
    town_update_password: String,
    players: Vec<Player>,
    sessions: Vec<PlayerSession>,
    vehicles: Vec<Vehicle>,
    conversation_areas: Vec<ConversationArea>,
    listeners: Listeners,
}

impl TownController {
    /// Creates an empty town with a fresh update password.
    pub fn new(
        town_id: TownId,
        friendly_name: impl Into<String>,
        is_publicly_listed: bool,
        capacity: usize,
    ) -> Self {
        Self {
            town_id,
            friendly_name: friendly_name.into(),
            is_publicly_listed,
            capacity,
            town_update_password: generate_password(),
            players: Vec::new(),
            sessions: Vec::new(),
            vehicles: Vec::new(),
            conversation_areas: Vec::new(),
            listeners: Listeners::new(),
        }
    }

    // -- Town metadata --

    pub fn town_id(&self) -> &TownId {
        &self.town_id
    }

    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    pub fn set_friendly_name(&mut self, name: impl Into<String>) {
        self.friendly_name = name.into();
    }

    pub fn is_publicly_listed(&self) -> bool {
        self.is_publicly_listed
    }

    pub fn set_publicly_listed(&mut self, listed: bool) {
        self.is_publicly_listed = listed;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn town_update_password(&self) -> &str {
        &self.town_update_password
    }

    /// Number of subscribed listeners, i.e. connected clients.
    pub fn occupancy(&self) -> usize {
        self.listeners.len()
    }

    // -- Read access --

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn vehicles(&self) -> &[Vehicle] {
        &self.vehicles
    }

    pub fn vehicle(&self, vehicle_id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.id == vehicle_id)
    }

    pub fn conversation_areas(&self) -> &[ConversationArea] {
        &self.conversation_areas
    }

    pub fn conversation_area(&self, label: &str) -> Option<&ConversationArea> {
        self.conversation_areas.iter().find(|a| a.label == label)
    }

    /// Returns the session issued with `token`, if it is still live.
    pub fn session_by_token(&self, token: &str) -> Option<&PlayerSession> {
        self.sessions.iter().find(|s| s.session_token == token)
    }

    /// Marks the session as held by a realtime subscriber and returns its
    /// player.
    pub fn claim_session(&mut self, token: &str) -> Option<PlayerId> {
        let session =
            self.sessions.iter_mut().find(|s| s.session_token == token)?;
        session.claimed = true;
        Some(session.player_id)
    }

    /// Destroys the session with `token` if no subscriber ever claimed it.
    /// Returns whether it was destroyed.
    pub fn expire_unclaimed_session(&mut self, token: &str) -> bool {
        let unclaimed = self
            .session_by_token(token)
            .is_some_and(|s| !s.claimed);
        if unclaimed {
            tracing::info!(town_id = %self.town_id, "session expired before subscribing");
            self.destroy_session(token);
        }
        unclaimed
    }

    /// The vehicle `driver` is driving. Passengers are not matched.
    pub fn find_vehicle(&self, driver: PlayerId) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.driver_id() == Some(driver))
    }

    /// The vehicle `player_id` occupies any seat of.
    pub fn riding_vehicle(&self, player_id: PlayerId) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.has_passenger(player_id))
    }

    pub fn player_infos(&self) -> Vec<PlayerInfo> {
        self.players.iter().map(PlayerInfo::from).collect()
    }

    pub fn vehicle_infos(&self) -> Vec<VehicleInfo> {
        self.vehicles.iter().map(|v| self.vehicle_info(v)).collect()
    }

    /// Builds the broadcast shape of `vehicle`, resolving passenger names.
    pub fn vehicle_info(&self, vehicle: &Vehicle) -> VehicleInfo {
        let passengers = vehicle
            .passengers
            .iter()
            .filter_map(|seat| {
                self.player(seat.player_id).map(|player| PassengerInfo {
                    player_id: seat.player_id,
                    user_name: player.user_name.clone(),
                    is_driver: seat.is_driver,
                })
            })
            .collect();
        VehicleInfo {
            id: vehicle.id,
            kind: vehicle.kind,
            capacity: vehicle.capacity(),
            speed: vehicle.speed(),
            location: vehicle.location,
            lock: vehicle.lock,
            passengers,
        }
    }

    // -- Listeners --

    /// A handle to this town's listener set.
    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub fn add_town_listener(
        &self,
        listener: Arc<dyn TownListener>,
    ) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_town_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    // -- Players --

    /// Admits `player` and issues its session.
    ///
    /// The video token is requested before anything is recorded, so a
    /// provider failure leaves the town untouched.
    ///
    /// # Errors
    /// Returns [`TownError::VideoToken`] if the provider refuses.
    pub async fn add_player<V: VideoClient>(
        &mut self,
        player: Player,
        video: &V,
    ) -> Result<PlayerSession, TownError> {
        let video_token = video.token_for_town(&self.town_id, player.id).await?;
        let session = PlayerSession::new(player.id, video_token);
        let info = PlayerInfo::from(&player);

        self.players.push(player);
        self.sessions.push(session.clone());
        self.listeners.notify(|l| l.on_player_joined(&info));

        tracing::info!(
            town_id = %self.town_id,
            player_id = %info.id,
            user_name = %info.user_name,
            "player joined"
        );
        Ok(session)
    }

    /// Removes the session with `token` and its player.
    ///
    /// A rider gets off first (a driver getting off destroys the vehicle),
    /// then listeners hear about the disconnect, then the player leaves
    /// its conversation area.
    pub fn destroy_session(&mut self, token: &str) {
        let Some(index) =
            self.sessions.iter().position(|s| s.session_token == token)
        else {
            tracing::debug!(town_id = %self.town_id, "unknown session token");
            return;
        };
        let session = self.sessions.remove(index);
        let player_id = session.player_id;

        if let Some(vehicle_id) = self.riding_vehicle(player_id).map(|v| v.id) {
            self.get_off_vehicle(player_id, vehicle_id);
        }

        let Some(index) = self.players.iter().position(|p| p.id == player_id)
        else {
            return;
        };
        let player = self.players.remove(index);
        let info = PlayerInfo::from(&player);
        self.listeners.notify(|l| l.on_player_disconnected(&info));

        if let Some(label) = &player.active_conversation_area {
            self.remove_player_from_conversation_area(player_id, label);
        }

        tracing::info!(town_id = %self.town_id, %player_id, "player left");
    }

    /// Moves a player and reconciles conversation-area membership.
    ///
    /// The client's `conversation_label` is trusted as-is; a label that
    /// names no area clears the player's membership.
    pub fn update_player_location(
        &mut self,
        player_id: PlayerId,
        location: UserLocation,
    ) {
        let Some(index) = self.players.iter().position(|p| p.id == player_id)
        else {
            tracing::debug!(town_id = %self.town_id, %player_id, "move for unknown player");
            return;
        };

        let next = location
            .conversation_label
            .as_deref()
            .and_then(|label| self.conversation_area(label))
            .map(|area| area.label.clone());

        let player = &mut self.players[index];
        let previous = player.active_conversation_area.take();
        player.location = location;
        player.active_conversation_area = next.clone();

        if previous != next {
            if let Some(label) = &previous {
                self.remove_player_from_conversation_area(player_id, label);
            }
        }

        if let Some(label) = &next {
            if let Some(area) =
                self.conversation_areas.iter_mut().find(|a| &a.label == label)
            {
                if !area.occupants_by_id.contains(&player_id) {
                    area.occupants_by_id.push(player_id);
                    let snapshot = area.clone();
                    self.listeners
                        .notify(|l| l.on_conversation_area_updated(&snapshot));
                }
            }
        }

        let info = PlayerInfo::from(&self.players[index]);
        self.listeners.notify(|l| l.on_player_moved(&info));
    }

    // -- Conversation areas --

    /// Creates a conversation area.
    ///
    /// Rejected when the label is taken, the topic is empty, or the box
    /// overlaps an existing area. Supplied occupants are ignored: the
    /// occupants are whichever players currently stand inside the box.
    pub fn add_conversation_area(&mut self, mut area: ConversationArea) -> bool {
        if self.conversation_area(&area.label).is_some() {
            tracing::debug!(town_id = %self.town_id, label = %area.label, "duplicate conversation label");
            return false;
        }
        if area.topic.is_empty() {
            return false;
        }
        if self
            .conversation_areas
            .iter()
            .any(|existing| existing.bounding_box.overlaps(&area.bounding_box))
        {
            tracing::debug!(town_id = %self.town_id, label = %area.label, "conversation area overlaps");
            return false;
        }

        area.occupants_by_id.clear();
        let mut moved_out: Vec<(PlayerId, String)> = Vec::new();
        for player in &mut self.players {
            if player.is_within(&area.bounding_box) {
                let previous = player
                    .active_conversation_area
                    .replace(area.label.clone());
                if let Some(previous) = previous {
                    moved_out.push((player.id, previous));
                }
                area.occupants_by_id.push(player.id);
            }
        }
        // A player belongs to one area at a time.
        for (player_id, previous) in moved_out {
            self.remove_player_from_conversation_area(player_id, &previous);
        }

        tracing::info!(
            town_id = %self.town_id,
            label = %area.label,
            occupants = area.occupants_by_id.len(),
            "conversation area created"
        );
        self.listeners.notify(|l| l.on_conversation_area_updated(&area));
        self.conversation_areas.push(area);
        true
    }

    /// Takes `player_id` out of the area labelled `label`, destroying the
    /// area when it empties. Leaves the player's back-reference alone.
    pub fn remove_player_from_conversation_area(
        &mut self,
        player_id: PlayerId,
        label: &str,
    ) {
        let Some(index) =
            self.conversation_areas.iter().position(|a| a.label == label)
        else {
            return;
        };
        let area = &mut self.conversation_areas[index];
        let Some(seat) = area.occupants_by_id.iter().position(|id| *id == player_id)
        else {
            return;
        };
        area.occupants_by_id.remove(seat);

        if area.occupants_by_id.is_empty() {
            let area = self.conversation_areas.remove(index);
            tracing::info!(town_id = %self.town_id, label = %area.label, "conversation area destroyed");
            self.listeners
                .notify(|l| l.on_conversation_area_destroyed(&area));
        } else {
            let snapshot = area.clone();
            self.listeners
                .notify(|l| l.on_conversation_area_updated(&snapshot));
        }
    }

    // -- Vehicles --

    /// Spawns a vehicle of kind `kind` at `init_location` with `driver`
    /// behind the wheel.
    ///
    /// Returns `None` without side effects when the kind is unknown, the
    /// driver is not in the town, or the driver already occupies a seat.
    pub fn create_init_vehicle(
        &mut self,
        driver: PlayerId,
        init_location: &UserLocation,
        kind: &str,
    ) -> Option<VehicleId> {
        let Some(kind) = VehicleKind::parse(kind) else {
            tracing::warn!(town_id = %self.town_id, %driver, kind, "unknown vehicle kind");
            return None;
        };
        if self.riding_vehicle(driver).is_some() {
            return None;
        }
        let player = self.players.iter_mut().find(|p| p.id == driver)?;
        player.visible = false;
        let driver_info = PlayerInfo::from(&*player);

        let mut vehicle = Vehicle::new(kind);
        vehicle.location = VehicleLocation::from(init_location);
        vehicle.add_passenger(driver, true);
        let vehicle_id = vehicle.id;
        let info = self.vehicle_info(&vehicle);
        self.vehicles.push(vehicle);

        self.listeners.notify(|l| l.on_player_invisible(&driver_info));
        self.listeners.notify(|l| l.on_vehicle_created(&info));

        tracing::info!(town_id = %self.town_id, %vehicle_id, %kind, %driver, "vehicle created");
        Some(vehicle_id)
    }

    /// Seats `player_id` as a passenger.
    ///
    /// # Errors
    /// Fails without changing anything if the player or vehicle is
    /// unknown, the player already rides something, or the vehicle is
    /// locked or full.
    pub fn get_on_vehicle(
        &mut self,
        player_id: PlayerId,
        vehicle_id: VehicleId,
    ) -> Result<(), TownError> {
        let player_index = self
            .players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or(TownError::PlayerNotFound(player_id))?;
        let vehicle_index = self
            .vehicles
            .iter()
            .position(|v| v.id == vehicle_id)
            .ok_or(TownError::VehicleNotFound(vehicle_id))?;
        if self.riding_vehicle(player_id).is_some() {
            return Err(TownError::AlreadyRiding(player_id));
        }
        let vehicle = &self.vehicles[vehicle_index];
        if vehicle.lock {
            return Err(TownError::VehicleLocked(vehicle_id));
        }
        if vehicle.is_full() {
            return Err(TownError::VehicleFull(vehicle_id));
        }

        self.players[player_index].visible = false;
        self.vehicles[vehicle_index].add_passenger(player_id, false);

        let passenger = PlayerInfo::from(&self.players[player_index]);
        let info = self.vehicle_info(&self.vehicles[vehicle_index]);
        self.listeners
            .notify(|l| l.on_vehicle_update_passengers(&info, &passenger));
        Ok(())
    }

    /// Takes `player_id` off the vehicle. The driver getting off ends the
    /// ride for everyone.
    pub fn get_off_vehicle(&mut self, player_id: PlayerId, vehicle_id: VehicleId) {
        let Some(vehicle_index) =
            self.vehicles.iter().position(|v| v.id == vehicle_id)
        else {
            return;
        };
        let Some(seat) = self.vehicles[vehicle_index]
            .passengers
            .iter()
            .find(|p| p.player_id == player_id)
            .copied()
        else {
            return;
        };
        if seat.is_driver {
            self.destroy_vehicle(vehicle_id);
            return;
        }

        self.vehicles[vehicle_index].remove_passenger(player_id);
        let Some(player) = self.players.iter_mut().find(|p| p.id == player_id)
        else {
            return;
        };
        player.visible = true;
        let passenger = PlayerInfo::from(&*player);
        let info = self.vehicle_info(&self.vehicles[vehicle_index]);

        self.listeners
            .notify(|l| l.on_vehicle_get_off_passenger(&info, &passenger));
        self.listeners.notify(|l| l.on_player_visible(&passenger));
    }

    /// Removes the vehicle and makes every passenger visible again.
    pub fn destroy_vehicle(&mut self, vehicle_id: VehicleId) {
        let Some(index) = self.vehicles.iter().position(|v| v.id == vehicle_id)
        else {
            tracing::debug!(town_id = %self.town_id, %vehicle_id, "destroy for unknown vehicle");
            return;
        };
        let vehicle = self.vehicles.remove(index);

        let mut freed = Vec::with_capacity(vehicle.passengers.len());
        for seat in &vehicle.passengers {
            if let Some(player) =
                self.players.iter_mut().find(|p| p.id == seat.player_id)
            {
                player.visible = true;
                freed.push(PlayerInfo::from(&*player));
            }
        }
        let info = self.vehicle_info(&vehicle);

        self.listeners.notify(|l| l.on_vehicle_destroyed(&info, &freed));
        for player in &freed {
            self.listeners.notify(|l| l.on_player_visible(player));
        }

        tracing::info!(town_id = %self.town_id, %vehicle_id, "vehicle destroyed");
    }

    /// Moves the vehicle and carries every passenger along with it.
    ///
    /// Riders take the vehicle's position with no conversation label, so
    /// they leave any conversation area they were in.
    pub fn update_vehicle_location(
        &mut self,
        vehicle_id: VehicleId,
        location: VehicleLocation,
    ) {
        let Some(vehicle) = self.vehicles.iter_mut().find(|v| v.id == vehicle_id)
        else {
            return;
        };
        vehicle.location = location;
        let riders: Vec<PlayerId> =
            vehicle.passengers.iter().map(|p| p.player_id).collect();

        let rider_location = UserLocation::from(&location);
        for rider in riders {
            if self.player(rider).is_some() {
                self.update_player_location(rider, rider_location.clone());
            }
        }

        if let Some(vehicle) = self.vehicle(vehicle_id) {
            let info = self.vehicle_info(vehicle);
            self.listeners.notify(|l| l.on_vehicle_moved(&info));
        }
    }

    /// Toggles whether new passengers may board.
    pub fn change_vehicle_lock_situation(&mut self, vehicle_id: VehicleId) {
        let Some(vehicle) = self.vehicles.iter_mut().find(|v| v.id == vehicle_id)
        else {
            return;
        };
        vehicle.lock = !vehicle.lock;
        if let Some(vehicle) = self.vehicle(vehicle_id) {
            let info = self.vehicle_info(vehicle);
            self.listeners
                .notify(|l| l.on_vehicle_change_lock_situation(&info));
        }
    }

    // -- Town-wide --

    /// Relays a chat line to every listener.
    pub fn chat(&self, message: ChatMessage) {
        self.listeners.notify(|l| l.on_chat_message(&message));
    }

    /// Tells every listener the town is going away.
    pub fn disconnect_all_players(&self) {
        tracing::info!(town_id = %self.town_id, listeners = self.listeners.len(), "disconnecting all players");
        self.listeners.notify(|l| l.on_town_destroyed());
    }
}
