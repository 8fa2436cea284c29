//! Administrative requests: town CRUD, joining, and area creation.
//!
//! Each [`ApiRequest`] gets exactly one [`ApiResponse`]. Rejections are
//! answered with `ApiResponse::Error` rather than closing the connection.

use std::sync::Arc;
use std::time::Duration;

use covey_protocol::{ApiRequest, ApiResponse, Codec, ConversationArea, TownId};
use covey_town::{Player, SharedTown, VideoClient};
use tokio::time;

use crate::server::ServerState;

const BAD_PASSWORD: &str = "Invalid password or update values specified. \
                            Please double check your town update password.";

fn error(code: u16, message: impl Into<String>) -> ApiResponse {
    ApiResponse::Error {
        code,
        message: message.into(),
    }
}

/// Serves one administrative request.
pub(crate) async fn handle_request<V, C>(
    state: &Arc<ServerState<V, C>>,
    request: ApiRequest,
) -> ApiResponse
where
    V: VideoClient,
    C: Codec,
{
    match request {
        ApiRequest::CreateTown {
            friendly_name,
            is_publicly_listed,
        } => {
            if friendly_name.is_empty() {
                return error(400, "FriendlyName must be specified");
            }
            let (town_id, update_password) = state
                .registry
                .lock()
                .await
                .create_town(friendly_name, is_publicly_listed);
            ApiResponse::TownCreated {
                town_id,
                update_password,
            }
        }

        ApiRequest::ListTowns => {
            let towns = state.registry.lock().await.get_towns().await;
            ApiResponse::TownList { towns }
        }

        ApiRequest::UpdateTown {
            town_id,
            password,
            friendly_name,
            is_publicly_listed,
        } => {
            let updated = state
                .registry
                .lock()
                .await
                .update_town(&town_id, &password, friendly_name, is_publicly_listed)
                .await;
            if updated {
                ApiResponse::TownUpdated
            } else {
                error(400, BAD_PASSWORD)
            }
        }

        ApiRequest::DeleteTown { town_id, password } => {
            let deleted = state
                .registry
                .lock()
                .await
                .delete_town(&town_id, &password)
                .await;
            if deleted {
                ApiResponse::TownDeleted
            } else {
                error(400, BAD_PASSWORD)
            }
        }

        ApiRequest::JoinTown { town_id, user_name } => {
            join_town(state, &town_id, user_name).await
        }

        ApiRequest::CreateConversationArea {
            town_id,
            session_token,
            area,
        } => create_conversation_area(state, &town_id, &session_token, area).await,
    }
}

async fn join_town<V, C>(
    state: &Arc<ServerState<V, C>>,
    town_id: &TownId,
    user_name: String,
) -> ApiResponse
where
    V: VideoClient,
    C: Codec,
{
    if user_name.is_empty() {
        return error(400, "userName must be specified");
    }
    // Release the registry before touching the town.
    let Some(shared) = state.registry.lock().await.get_controller_for_town(town_id)
    else {
        return error(404, "Error: No such town");
    };
    let mut town = shared.lock().await;

    match town.add_player(Player::new(user_name), &state.video).await {
        Ok(session) => {
            expire_if_unclaimed(
                Arc::clone(&shared),
                session.session_token.clone(),
                state.idle_timeout,
            );
            ApiResponse::TownJoined {
                player_id: session.player_id,
                session_token: session.session_token,
                video_token: session.video_token,
                friendly_name: town.friendly_name().to_string(),
                is_publicly_listed: town.is_publicly_listed(),
                players: town.player_infos(),
                vehicles: town.vehicle_infos(),
                conversation_areas: town.conversation_areas().to_vec(),
            }
        }
        Err(e) => {
            tracing::warn!(%town_id, error = %e, "join failed");
            error(500, e.to_string())
        }
    }
}

/// Ends a joined session that no connection subscribes with within
/// `grace`.
fn expire_if_unclaimed(town: SharedTown, session_token: String, grace: Duration) {
    tokio::spawn(async move {
        time::sleep(grace).await;
        town.lock().await.expire_unclaimed_session(&session_token);
    });
}

async fn create_conversation_area<V, C>(
    state: &Arc<ServerState<V, C>>,
    town_id: &TownId,
    session_token: &str,
    area: ConversationArea,
) -> ApiResponse
where
    V: VideoClient,
    C: Codec,
{
    let rejection = format!(
        "Unable to create conversation area {} with topic {}",
        area.label, area.topic
    );
    let Some(town) = state.registry.lock().await.get_controller_for_town(town_id)
    else {
        return error(400, rejection);
    };
    let mut town = town.lock().await;
    if town.session_by_token(session_token).is_none() {
        return error(400, rejection);
    }
    if town.add_conversation_area(area) {
        ApiResponse::ConversationAreaCreated
    } else {
        error(400, rejection)
    }
}
