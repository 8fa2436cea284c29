//! Message enums and the envelope that carries them.
//!
//! A frame on the wire is always one [`Envelope`]. Its [`Payload`] says
//! which family the message belongs to:
//!
//! - `System`: connection plumbing (subscribe, heartbeat, errors).
//! - `Request` / `Response`: administrative calls (create, list, update,
//!   delete, join) answered once, correlated by `reply_to`.
//! - `Client` / `Server`: realtime town events after subscribing.

use serde::{Deserialize, Serialize};

use crate::types::{
    ChatMessage, ConversationArea, PlayerId, PlayerInfo, TownId,
    TownListing, UserLocation, VehicleId, VehicleInfo, VehicleLocation,
};

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// Connection-level messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
    /// Client → Server: attach this connection to a town session.
    Subscribe {
        version: u32,
        town_id: TownId,
        session_token: String,
    },

    /// Server → Client: the subscription was accepted.
    Subscribed { player_id: PlayerId, server_time: u64 },

    /// Client → Server keep-alive.
    Heartbeat { client_time: u64 },

    /// Server → Client: echoes `client_time` for RTT measurement.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Either direction: the connection is about to close.
    Disconnect { reason: String },

    /// HTTP-style status code plus a human-readable message.
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Administrative requests
// ---------------------------------------------------------------------------

/// Administrative calls a client may make before (or without) subscribing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ApiRequest {
    CreateTown {
        friendly_name: String,
        is_publicly_listed: bool,
    },
    ListTowns,
    UpdateTown {
        town_id: TownId,
        password: String,
        #[serde(default)]
        friendly_name: Option<String>,
        #[serde(default)]
        is_publicly_listed: Option<bool>,
    },
    DeleteTown {
        town_id: TownId,
        password: String,
    },
    /// Adds a player to the town and hands back the credentials needed
    /// to subscribe.
    JoinTown { town_id: TownId, user_name: String },
    CreateConversationArea {
        town_id: TownId,
        session_token: String,
        area: ConversationArea,
    },
}

/// Replies to [`ApiRequest`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ApiResponse {
    TownCreated {
        town_id: TownId,
        update_password: String,
    },
    TownList { towns: Vec<TownListing> },
    TownUpdated,
    TownDeleted,
    TownJoined {
        player_id: PlayerId,
        session_token: String,
        video_token: String,
        friendly_name: String,
        is_publicly_listed: bool,
        players: Vec<PlayerInfo>,
        vehicles: Vec<VehicleInfo>,
        conversation_areas: Vec<ConversationArea>,
    },
    ConversationAreaCreated,
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Realtime events
// ---------------------------------------------------------------------------

/// Realtime events a subscribed client sends. The acting player is always
/// the one bound to the connection, never a field of the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    PlayerMovement { location: UserLocation },
    /// Moves the vehicle this player drives.
    VehicleMovement { location: VehicleLocation },
    VehicleChangeLockSituation { vehicle_id: VehicleId },
    DestroyVehicle { vehicle_id: VehicleId },
    GetOffVehicle { vehicle_id: VehicleId },
    /// `vehicle_type` is a free-form kind name; unknown names are ignored.
    NewVehicle {
        location: UserLocation,
        vehicle_type: String,
    },
    GetOnVehicle { vehicle_id: VehicleId },
    ChatMessage { body: String },
}

/// Realtime events the server pushes to every subscribed client of a town.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    NewPlayer { player: PlayerInfo },
    PlayerMoved { player: PlayerInfo },
    PlayerDisconnect { player: PlayerInfo },
    PlayerInvisible { player: PlayerInfo },
    PlayerVisible { player: PlayerInfo },
    VehicleCreated { vehicle: VehicleInfo },
    VehicleMoved { vehicle: VehicleInfo },
    VehicleChangedLockSituation { vehicle: VehicleInfo },
    VehicleUpdatePassengers {
        vehicle: VehicleInfo,
        passenger: PlayerInfo,
    },
    VehicleGetOffPassenger {
        vehicle: VehicleInfo,
        passenger: PlayerInfo,
    },
    VehicleDestroyed {
        vehicle: VehicleInfo,
        passengers: Vec<PlayerInfo>,
    },
    ConversationUpdated { area: ConversationArea },
    ConversationDestroyed { area: ConversationArea },
    ChatMessage { message: ChatMessage },
    TownClosing,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// What an envelope carries.
///
/// Adjacently tagged, so a heartbeat looks like
/// `{"type":"System","data":{"type":"Heartbeat","client_time":5}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    System(SystemMessage),
    Request(ApiRequest),
    Response(ApiResponse),
    Client(ClientEvent),
    Server(ServerEvent),
}

/// The top-level frame. Every message on the wire is an `Envelope`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-sender sequence number.
    pub seq: u64,

    /// Milliseconds since the sender started.
    pub timestamp: u64,

    /// For responses, the `seq` of the request being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<u64>,

    pub payload: Payload,
}

impl Envelope {
    /// Builds an envelope that is not a reply.
    pub fn new(seq: u64, timestamp: u64, payload: Payload) -> Self {
        Self {
            seq,
            timestamp,
            reply_to: None,
            payload,
        }
    }

    /// Builds an envelope answering the request numbered `request_seq`.
    pub fn reply(
        seq: u64,
        timestamp: u64,
        request_seq: u64,
        payload: Payload,
    ) -> Self {
        Self {
            seq,
            timestamp,
            reply_to: Some(request_seq),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, VehicleKind};

    fn player(id: u64) -> PlayerInfo {
        PlayerInfo {
            id: PlayerId(id),
            user_name: format!("user{id}"),
            location: UserLocation::default(),
            visible: true,
        }
    }

    #[test]
    fn test_subscribe_json_format() {
        let msg = SystemMessage::Subscribe {
            version: 1,
            town_id: TownId::from("DEMO"),
            session_token: "abc".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "Subscribe");
        assert_eq!(json["town_id"], "DEMO");
        assert_eq!(json["session_token"], "abc");
    }

    #[test]
    fn test_payload_is_adjacently_tagged() {
        let payload =
            Payload::System(SystemMessage::Heartbeat { client_time: 5 });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "System");
        assert_eq!(json["data"]["type"], "Heartbeat");
        assert_eq!(json["data"]["client_time"], 5);
    }

    #[test]
    fn test_envelope_reply_to_omitted_when_none() {
        let envelope = Envelope::new(
            1,
            0,
            Payload::Request(ApiRequest::ListTowns),
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("reply_to").is_none());

        let reply = Envelope::reply(
            9,
            0,
            1,
            Payload::Response(ApiResponse::TownUpdated),
        );
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["reply_to"], 1);
    }

    #[test]
    fn test_client_event_uses_camel_case_tags() {
        let event = ClientEvent::VehicleChangeLockSituation {
            vehicle_id: VehicleId(3),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "vehicleChangeLockSituation");
        assert_eq!(json["vehicle_id"], 3);
    }

    #[test]
    fn test_client_event_new_vehicle_decodes_from_browser_json() {
        let json = r#"{
            "type": "newVehicle",
            "location": {"x": 5, "y": 6, "rotation": "front", "moving": false},
            "vehicle_type": "Car"
        }"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::NewVehicle {
                location,
                vehicle_type,
            } => {
                assert_eq!(location.rotation, Direction::Front);
                assert_eq!(vehicle_type, "Car");
            }
            other => panic!("expected NewVehicle, got {other:?}"),
        }
    }

    #[test]
    fn test_client_event_unknown_tag_fails() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"type": "teleport"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_event_tags_match_client_listeners() {
        let cases = [
            (ServerEvent::NewPlayer { player: player(1) }, "newPlayer"),
            (ServerEvent::PlayerMoved { player: player(1) }, "playerMoved"),
            (
                ServerEvent::PlayerDisconnect { player: player(1) },
                "playerDisconnect",
            ),
            (ServerEvent::TownClosing, "townClosing"),
        ];
        for (event, tag) in cases {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], tag);
        }
    }

    #[test]
    fn test_vehicle_destroyed_carries_passenger_list() {
        let vehicle = VehicleInfo {
            id: VehicleId(1),
            kind: VehicleKind::Dinosaur,
            capacity: 2,
            speed: 1.5,
            location: VehicleLocation::default(),
            lock: false,
            passengers: Vec::new(),
        };
        let event = ServerEvent::VehicleDestroyed {
            vehicle,
            passengers: vec![player(1), player(2)],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "vehicleDestroyed");
        assert_eq!(json["vehicle"]["kind"], "Dinosaur");
        assert_eq!(json["passengers"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_update_town_optional_fields_default_to_none() {
        let json = r#"{"type": "UpdateTown", "town_id": "ABC", "password": "pw"}"#;
        let request: ApiRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            request,
            ApiRequest::UpdateTown {
                town_id: TownId::from("ABC"),
                password: "pw".into(),
                friendly_name: None,
                is_publicly_listed: None,
            }
        );
    }
}
