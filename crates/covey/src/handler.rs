//! Per-connection handler: requests, subscription, and realtime routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Serve requests and heartbeats until a `Subscribe` arrives
//!   2. Validate the town and session token, register a listener
//!   3. Send `Subscribed`
//!   4. Loop: apply inbound client events, forward outbound town events

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use covey_protocol::{
    ChatMessage, ClientEvent, Codec, ConversationArea, Envelope, Payload,
    PlayerId, PlayerInfo, ProtocolError, ServerEvent, SystemMessage, TownId,
    VehicleInfo, PROTOCOL_VERSION,
};
use covey_town::{
    ListenerId, SharedTown, TownController, TownListener, VideoClient,
};
use covey_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc};
use tokio::time;

use crate::CoveyError;
use crate::api::handle_request;
use crate::server::ServerState;

// ---------------------------------------------------------------------------
// Town listener for one connection
// ---------------------------------------------------------------------------

/// Events queued for one connection before its client counts as stalled.
const EVENT_QUEUE_CAPACITY: usize = 256;

/// Turns town notifications into [`ServerEvent`]s for one connection.
///
/// The controller calls this while the town is locked, so it only
/// enqueues; the handler task does the socket writes. The queue is
/// bounded: when a client stops reading and the queue fills, further
/// events are dropped and `overflow` tells the handler to disconnect it.
struct ConnectionListener {
    tx: mpsc::Sender<ServerEvent>,
    overflow: Arc<Notify>,
}

impl ConnectionListener {
    fn push(&self, event: ServerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.overflow.notify_one(),
            // The receiver is gone once the handler exits; its guard
            // removes this listener shortly after.
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

impl TownListener for ConnectionListener {
    fn on_player_joined(&self, player: &PlayerInfo) {
        self.push(ServerEvent::NewPlayer {
            player: player.clone(),
        });
    }

    fn on_player_moved(&self, player: &PlayerInfo) {
        self.push(ServerEvent::PlayerMoved {
            player: player.clone(),
        });
    }

    fn on_player_disconnected(&self, player: &PlayerInfo) {
        self.push(ServerEvent::PlayerDisconnect {
            player: player.clone(),
        });
    }

    fn on_player_invisible(&self, player: &PlayerInfo) {
        self.push(ServerEvent::PlayerInvisible {
            player: player.clone(),
        });
    }

    fn on_player_visible(&self, player: &PlayerInfo) {
        self.push(ServerEvent::PlayerVisible {
            player: player.clone(),
        });
    }

    fn on_town_destroyed(&self) {
        self.push(ServerEvent::TownClosing);
    }

    fn on_conversation_area_updated(&self, area: &ConversationArea) {
        self.push(ServerEvent::ConversationUpdated { area: area.clone() });
    }

    fn on_conversation_area_destroyed(&self, area: &ConversationArea) {
        self.push(ServerEvent::ConversationDestroyed { area: area.clone() });
    }

    fn on_vehicle_created(&self, vehicle: &VehicleInfo) {
        self.push(ServerEvent::VehicleCreated {
            vehicle: vehicle.clone(),
        });
    }

    fn on_vehicle_moved(&self, vehicle: &VehicleInfo) {
        self.push(ServerEvent::VehicleMoved {
            vehicle: vehicle.clone(),
        });
    }

    fn on_vehicle_change_lock_situation(&self, vehicle: &VehicleInfo) {
        self.push(ServerEvent::VehicleChangedLockSituation {
            vehicle: vehicle.clone(),
        });
    }

    fn on_vehicle_update_passengers(
        &self,
        vehicle: &VehicleInfo,
        passenger: &PlayerInfo,
    ) {
        self.push(ServerEvent::VehicleUpdatePassengers {
            vehicle: vehicle.clone(),
            passenger: passenger.clone(),
        });
    }

    fn on_vehicle_get_off_passenger(
        &self,
        vehicle: &VehicleInfo,
        passenger: &PlayerInfo,
    ) {
        self.push(ServerEvent::VehicleGetOffPassenger {
            vehicle: vehicle.clone(),
            passenger: passenger.clone(),
        });
    }

    fn on_vehicle_destroyed(
        &self,
        vehicle: &VehicleInfo,
        passengers: &[PlayerInfo],
    ) {
        self.push(ServerEvent::VehicleDestroyed {
            vehicle: vehicle.clone(),
            passengers: passengers.to_vec(),
        });
    }

    fn on_chat_message(&self, message: &ChatMessage) {
        self.push(ServerEvent::ChatMessage {
            message: message.clone(),
        });
    }
}

// ---------------------------------------------------------------------------
// Subscription lifetime
// ---------------------------------------------------------------------------

/// A connection bound to one player's session in one town.
struct Subscription {
    town: SharedTown,
    town_id: TownId,
    player_id: PlayerId,
    events: mpsc::Receiver<ServerEvent>,
    overflow: Arc<Notify>,
    _guard: SubscriptionGuard,
}

/// Unsubscribes the listener and ends the session when the handler exits.
///
/// `Drop` is synchronous, so the async cleanup is spawned.
struct SubscriptionGuard {
    town: SharedTown,
    listener_id: ListenerId,
    session_token: String,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let town = Arc::clone(&self.town);
        let listener_id = self.listener_id;
        let session_token = std::mem::take(&mut self.session_token);
        tokio::spawn(async move {
            let mut town = town.lock().await;
            town.remove_town_listener(listener_id);
            town.destroy_session(&session_token);
        });
    }
}

/// Resolves `town_id` and `session_token`, then subscribes a listener.
/// Returns `None` if either does not resolve.
async fn subscribe<V: VideoClient, C: Codec>(
    state: &ServerState<V, C>,
    town_id: TownId,
    session_token: String,
) -> Option<Subscription> {
    let town = state.registry.lock().await.get_controller_for_town(&town_id)?;

    let (tx, events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let overflow = Arc::new(Notify::new());
    let (player_id, listener_id) = {
        let mut controller = town.lock().await;
        let player_id = controller.claim_session(&session_token)?;
        let listener_id =
            controller.add_town_listener(Arc::new(ConnectionListener {
            tx,
            overflow: Arc::clone(&overflow),
        }));
        (player_id, listener_id)
    };

    Some(Subscription {
        _guard: SubscriptionGuard {
            town: Arc::clone(&town),
            listener_id,
            session_token,
        },
        town,
        town_id,
        player_id,
        events,
        overflow,
    })
}

// ---------------------------------------------------------------------------
// Connection flow
// ---------------------------------------------------------------------------

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<V, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<V, C>>,
) -> Result<(), CoveyError>
where
    V: VideoClient,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let mut seq: u64 = 1;
    let Some(subscription) = await_subscription(&conn, &state, &mut seq).await?
    else {
        return Ok(());
    };

    tracing::info!(
        %conn_id,
        town_id = %subscription.town_id,
        player_id = %subscription.player_id,
        "player subscribed"
    );
    let subscribed = Payload::System(SystemMessage::Subscribed {
        player_id: subscription.player_id,
        server_time: state.now(),
    });
    send_payload(&conn, &state, &mut seq, None, subscribed).await?;

    run_subscribed(&conn, &state, &mut seq, subscription).await
}

/// Serves requests until the client subscribes or leaves.
///
/// Returns `Ok(None)` if the connection ended without a valid
/// subscription.
async fn await_subscription<V, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<V, C>>,
    seq: &mut u64,
) -> Result<Option<Subscription>, CoveyError>
where
    V: VideoClient,
    C: Codec,
{
    loop {
        let data = match time::timeout(state.idle_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => return Ok(None),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                tracing::debug!(conn_id = %conn.id(), "idle before subscribing");
                return Ok(None);
            }
        };

        let envelope: Envelope = match state.codec.decode(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(error = %e, "failed to decode envelope");
                continue;
            }
        };

        match envelope.payload {
            Payload::Request(request) => {
                let response = handle_request(state, request).await;
                send_payload(
                    conn,
                    state,
                    seq,
                    Some(envelope.seq),
                    Payload::Response(response),
                )
                .await?;
            }

            Payload::System(SystemMessage::Subscribe {
                version,
                town_id,
                session_token,
            }) => {
                if version != PROTOCOL_VERSION {
                    send_error(
                        conn,
                        state,
                        seq,
                        400,
                        &format!(
                            "version mismatch: expected {PROTOCOL_VERSION}, got {version}"
                        ),
                    )
                    .await?;
                    let _ = conn.close().await;
                    return Err(ProtocolError::InvalidMessage(
                        "protocol version mismatch".into(),
                    )
                    .into());
                }

                match subscribe(state, town_id.clone(), session_token).await {
                    Some(subscription) => return Ok(Some(subscription)),
                    None => {
                        tracing::debug!(%town_id, "rejected subscription");
                        let _ = conn.close().await;
                        return Ok(None);
                    }
                }
            }

            Payload::System(SystemMessage::Heartbeat { client_time }) => {
                send_heartbeat_ack(conn, state, seq, client_time).await?;
            }

            Payload::System(SystemMessage::Disconnect { reason }) => {
                tracing::debug!(%reason, "client left before subscribing");
                return Ok(None);
            }

            Payload::Client(_) => {
                send_error(conn, state, seq, 400, "subscribe before sending events")
                    .await?;
            }

            _ => {
                tracing::debug!("ignoring unexpected message before subscribe");
            }
        }
    }
}

/// The realtime loop: inbound frames are applied to the town, outbound
/// town events are written to the socket. Returning drops `subscription`,
/// which unsubscribes the listener and destroys the session.
async fn run_subscribed<V, C>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<V, C>>,
    seq: &mut u64,
    mut subscription: Subscription,
) -> Result<(), CoveyError>
where
    V: VideoClient,
    C: Codec,
{
    let player_id = subscription.player_id;
    let idle = time::sleep(state.idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            event = subscription.events.recv() => {
                match event {
                    Some(ServerEvent::TownClosing) => {
                        send_payload(conn, state, seq, None, Payload::Server(ServerEvent::TownClosing)).await?;
                        tracing::info!(%player_id, "town closing, disconnecting");
                        let _ = conn.close().await;
                        return Ok(());
                    }
                    Some(event) => {
                        let send = send_payload(conn, state, seq, None, Payload::Server(event));
                        match time::timeout(state.idle_timeout, send).await {
                            Ok(sent) => sent?,
                            Err(_) => {
                                tracing::warn!(%player_id, "event write stalled, disconnecting");
                                return Ok(());
                            }
                        }
                    }
                    None => return Ok(()),
                }
            }

            frame = conn.recv() => {
                let data = match frame {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%player_id, "connection closed cleanly");
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::debug!(%player_id, error = %e, "recv error");
                        return Ok(());
                    }
                };
                idle.as_mut().reset(time::Instant::now() + state.idle_timeout);

                let envelope: Envelope = match state.codec.decode(&data) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        tracing::debug!(%player_id, error = %e, "failed to decode envelope");
                        continue;
                    }
                };

                match envelope.payload {
                    Payload::Client(event) => {
                        let mut town = subscription.town.lock().await;
                        apply_client_event(&mut town, player_id, event);
                    }
                    Payload::Request(request) => {
                        let response = handle_request(state, request).await;
                        send_payload(conn, state, seq, Some(envelope.seq), Payload::Response(response)).await?;
                    }
                    Payload::System(SystemMessage::Heartbeat { client_time }) => {
                        send_heartbeat_ack(conn, state, seq, client_time).await?;
                    }
                    Payload::System(SystemMessage::Disconnect { reason }) => {
                        tracing::info!(%player_id, %reason, "client disconnected");
                        return Ok(());
                    }
                    Payload::System(SystemMessage::Subscribe { .. }) => {
                        send_error(conn, state, seq, 400, "already subscribed").await?;
                    }
                    _ => {
                        tracing::debug!(%player_id, "ignoring unexpected message");
                    }
                }
            }

            _ = subscription.overflow.notified() => {
                tracing::warn!(%player_id, "client fell behind on events, disconnecting");
                let _ = conn.close().await;
                return Ok(());
            }

            _ = &mut idle => {
                tracing::info!(%player_id, "connection timed out");
                return Ok(());
            }
        }
    }
}

/// Applies one realtime event on behalf of `player_id`.
///
/// Failures are not reported to the client: the broadcast that would
/// have followed simply does not happen.
fn apply_client_event(
    town: &mut TownController,
    player_id: PlayerId,
    event: ClientEvent,
) {
    match event {
        ClientEvent::PlayerMovement { location } => {
            town.update_player_location(player_id, location);
        }
        ClientEvent::VehicleMovement { location } => {
            if let Some(vehicle_id) = town.find_vehicle(player_id).map(|v| v.id) {
                town.update_vehicle_location(vehicle_id, location);
            }
        }
        ClientEvent::VehicleChangeLockSituation { vehicle_id } => {
            town.change_vehicle_lock_situation(vehicle_id);
        }
        ClientEvent::DestroyVehicle { vehicle_id } => {
            town.destroy_vehicle(vehicle_id);
        }
        ClientEvent::GetOffVehicle { vehicle_id } => {
            town.get_off_vehicle(player_id, vehicle_id);
        }
        ClientEvent::NewVehicle {
            location,
            vehicle_type,
        } => {
            town.create_init_vehicle(player_id, &location, &vehicle_type);
        }
        ClientEvent::GetOnVehicle { vehicle_id } => {
            if let Err(e) = town.get_on_vehicle(player_id, vehicle_id) {
                tracing::debug!(%player_id, %vehicle_id, reason = %e, "boarding rejected");
            }
        }
        ClientEvent::ChatMessage { body } => {
            town.chat(ChatMessage {
                author: player_id,
                body,
                date_created: unix_millis(),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound helpers
// ---------------------------------------------------------------------------

async fn send_payload<V: VideoClient, C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<V, C>,
    seq: &mut u64,
    reply_to: Option<u64>,
    payload: Payload,
) -> Result<(), CoveyError> {
    let envelope = Envelope {
        seq: next_seq(seq),
        timestamp: state.now(),
        reply_to,
        payload,
    };
    let bytes = state.codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

async fn send_heartbeat_ack<V: VideoClient, C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<V, C>,
    seq: &mut u64,
    client_time: u64,
) -> Result<(), CoveyError> {
    let ack = Payload::System(SystemMessage::HeartbeatAck {
        client_time,
        server_time: state.now(),
    });
    send_payload(conn, state, seq, None, ack).await
}

/// Sends a `SystemMessage::Error` envelope to the client.
async fn send_error<V: VideoClient, C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<V, C>,
    seq: &mut u64,
    code: u16,
    message: &str,
) -> Result<(), CoveyError> {
    let error = Payload::System(SystemMessage::Error {
        code,
        message: message.to_string(),
    });
    send_payload(conn, state, seq, None, error).await
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use covey_protocol::{Direction, UserLocation, VehicleLocation};
    use covey_town::{DevVideoClient, Player};

    use super::*;

    fn town() -> TownController {
        TownController::new(TownId::from("HANDLER1"), "Handler", false, 50)
    }

    async fn join(town: &mut TownController) -> PlayerId {
        town.add_player(Player::new("p"), &DevVideoClient)
            .await
            .unwrap()
            .player_id
    }

    fn spot(x: f64, y: f64) -> UserLocation {
        UserLocation {
            x,
            y,
            rotation: Direction::Front,
            moving: false,
            conversation_label: None,
        }
    }

    #[test]
    fn test_next_seq_increments() {
        let mut seq = 5;
        assert_eq!(next_seq(&mut seq), 5);
        assert_eq!(next_seq(&mut seq), 6);
        assert_eq!(seq, 7);
    }

    #[tokio::test]
    async fn test_apply_new_vehicle_then_vehicle_movement_moves_driven_vehicle() {
        let mut town = town();
        let driver = join(&mut town).await;

        apply_client_event(
            &mut town,
            driver,
            ClientEvent::NewVehicle {
                location: spot(5.0, 5.0),
                vehicle_type: "Dinosaur".into(),
            },
        );
        let destination = VehicleLocation {
            x: 20.0,
            y: 30.0,
            rotation: Direction::Left,
            moving: true,
        };
        apply_client_event(
            &mut town,
            driver,
            ClientEvent::VehicleMovement {
                location: destination,
            },
        );

        assert_eq!(town.vehicles().len(), 1);
        assert_eq!(town.vehicles()[0].location, destination);
        assert_eq!(town.player(driver).unwrap().location.x, 20.0);
    }

    #[tokio::test]
    async fn test_apply_vehicle_movement_by_passenger_is_ignored() {
        let mut town = town();
        let driver = join(&mut town).await;
        let rider = join(&mut town).await;
        let car = town.create_init_vehicle(driver, &spot(5.0, 5.0), "Car").unwrap();
        town.get_on_vehicle(rider, car).unwrap();

        apply_client_event(
            &mut town,
            rider,
            ClientEvent::VehicleMovement {
                location: VehicleLocation::default(),
            },
        );

        assert_eq!(town.vehicle(car).unwrap().location.x, 5.0);
    }

    #[tokio::test]
    async fn test_apply_get_on_locked_vehicle_is_silent() {
        let mut town = town();
        let driver = join(&mut town).await;
        let rider = join(&mut town).await;
        let car = town.create_init_vehicle(driver, &spot(0.0, 0.0), "Car").unwrap();
        apply_client_event(
            &mut town,
            driver,
            ClientEvent::VehicleChangeLockSituation { vehicle_id: car },
        );

        apply_client_event(&mut town, rider, ClientEvent::GetOnVehicle { vehicle_id: car });

        assert_eq!(town.vehicle(car).unwrap().passengers.len(), 1);
        assert!(town.player(rider).unwrap().visible);
    }

    fn listener(
        capacity: usize,
    ) -> (ConnectionListener, mpsc::Receiver<ServerEvent>, Arc<Notify>) {
        let (tx, rx) = mpsc::channel(capacity);
        let overflow = Arc::new(Notify::new());
        let listener = ConnectionListener {
            tx,
            overflow: Arc::clone(&overflow),
        };
        (listener, rx, overflow)
    }

    #[test]
    fn test_connection_listener_forwards_town_closing() {
        let (listener, mut rx, _) = listener(4);

        listener.on_town_destroyed();

        assert_eq!(rx.try_recv().unwrap(), ServerEvent::TownClosing);
    }

    #[test]
    fn test_connection_listener_dropped_receiver_does_not_panic() {
        let (listener, rx, _) = listener(4);
        drop(rx);

        listener.on_town_destroyed();
    }

    #[tokio::test]
    async fn test_connection_listener_full_queue_signals_overflow() {
        let (listener, mut rx, overflow) = listener(1);

        listener.on_town_destroyed();
        listener.on_town_destroyed();

        time::timeout(Duration::from_millis(100), overflow.notified())
            .await
            .expect("overflow signalled");
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::TownClosing);
        assert!(rx.try_recv().is_err(), "second event was dropped");
    }

    #[tokio::test]
    async fn test_connection_listener_within_capacity_does_not_signal() {
        let (listener, _rx, overflow) = listener(2);

        listener.on_town_destroyed();
        listener.on_town_destroyed();

        assert!(
            time::timeout(Duration::from_millis(50), overflow.notified())
                .await
                .is_err()
        );
    }
}
