//! # Covey
//!
//! Realtime server for Covey towns: shared 2D spaces where players walk
//! around, gather in conversation areas, and ride vehicles together.
//!
//! Clients speak JSON [`Envelope`](covey_protocol::Envelope)s over a
//! WebSocket. Administrative requests (create, list, update, delete, and
//! join a town) work on any connection; after joining, a client sends
//! `Subscribe` with its session token to receive the town's events.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use covey::prelude::*;
//!
//! # async fn start() -> Result<(), CoveyError> {
//! let server = CoveyServerBuilder::new()
//!     .bind("0.0.0.0:8081")
//!     .build(DevVideoClient)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod api;
mod error;
mod handler;
mod server;

pub use error::CoveyError;
pub use server::{CoveyServer, CoveyServerBuilder};

/// Everything needed to start a server.
pub mod prelude {
    pub use crate::{CoveyError, CoveyServer, CoveyServerBuilder};
    pub use covey_protocol::{Codec, JsonCodec, PROTOCOL_VERSION};
    pub use covey_town::{
        DevVideoClient, RegistryConfig, TownError, VideoClient,
    };
}
