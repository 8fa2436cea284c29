//! Video provider hook.
//!
//! Joining a town requires a token from an external video service. The
//! controller asks a [`VideoClient`] for one; production deployments plug
//! in their provider, development and tests use [`DevVideoClient`].

use std::future::Future;

use covey_protocol::{PlayerId, TownId};

use crate::TownError;

/// Issues video-room tokens for players joining a town.
///
/// # Example
///
/// ```rust
/// use covey_protocol::{PlayerId, TownId};
/// use covey_town::{TownError, VideoClient};
///
/// /// Refuses every request, e.g. while the provider is down.
/// struct Offline;
///
/// impl VideoClient for Offline {
///     async fn token_for_town(
///         &self,
///         _town_id: &TownId,
///         _player_id: PlayerId,
///     ) -> Result<String, TownError> {
///         Err(TownError::VideoToken("provider offline".into()))
///     }
/// }
/// ```
pub trait VideoClient: Send + Sync + 'static {
    /// Returns a token that admits `player_id` to the video room of
    /// `town_id`.
    fn token_for_town(
        &self,
        town_id: &TownId,
        player_id: PlayerId,
    ) -> impl Future<Output = Result<String, TownError>> + Send;
}

/// Issues deterministic placeholder tokens without contacting anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevVideoClient;

impl VideoClient for DevVideoClient {
    async fn token_for_town(
        &self,
        town_id: &TownId,
        player_id: PlayerId,
    ) -> Result<String, TownError> {
        Ok(format!("dev-video:{town_id}:{}", player_id.0))
    }
}
