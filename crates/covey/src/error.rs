//! Unified error type for the Covey server.

use covey_protocol::ProtocolError;
use covey_town::TownError;
use covey_transport::TransportError;

/// Top-level error wrapping every layer's error.
///
/// `#[from]` lets `?` lift layer errors into this one.
#[derive(Debug, thiserror::Error)]
pub enum CoveyError {
    /// Accepting, sending, or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded, or broke a protocol rule.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A town operation failed.
    #[error(transparent)]
    Town(#[from] TownError),
}
