//! Wire protocol for the Covey town server.
//!
//! - **Types**: ids, locations, conversation areas, vehicle kinds and the
//!   snapshot shapes broadcast to clients.
//! - **Messages** ([`Envelope`], [`Payload`] and the enums it carries).
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Town (controller calls)
//! ```

mod codec;
mod error;
mod message;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::{
    ApiRequest, ApiResponse, ClientEvent, Envelope, Payload, ServerEvent,
    SystemMessage,
};
pub use types::{
    BoundingBox, ChatMessage, ConversationArea, Direction, PassengerInfo,
    PlayerId, PlayerInfo, TownId, TownListing, UserLocation, VehicleId,
    VehicleInfo, VehicleKind, VehicleLocation,
};

/// Version a client must announce in `SystemMessage::Subscribe`.
pub const PROTOCOL_VERSION: u32 = 1;
