//! `CoveyServer` builder and accept loop.
//!
//! Ties the layers together: the transport accepts connections, the
//! protocol decodes frames, and the town registry holds the state every
//! connection works on.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use covey_protocol::{Codec, JsonCodec};
use covey_town::{RegistryConfig, TownRegistry, VideoClient};
use covey_transport::{Transport, WebSocketTransport};
use tokio::sync::Mutex;

use crate::CoveyError;
use crate::handler::handle_connection;

/// Shared server state passed to each connection task.
pub(crate) struct ServerState<V: VideoClient, C: Codec> {
    pub(crate) registry: Mutex<TownRegistry>,
    pub(crate) video: V,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
    pub(crate) started: Instant,
}

impl<V: VideoClient, C: Codec> ServerState<V, C> {
    /// Milliseconds since the server started.
    pub(crate) fn now(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Builder for configuring and starting a Covey server.
///
/// # Example
///
/// ```rust,no_run
/// use covey::prelude::*;
///
/// # async fn start() -> Result<(), CoveyError> {
/// let server = CoveyServerBuilder::new()
///     .bind("0.0.0.0:8081")
///     .registry_config(RegistryConfig::from_env())
///     .build(DevVideoClient)
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct CoveyServerBuilder {
    bind_addr: String,
    registry_config: RegistryConfig,
    idle_timeout: Duration,
}

impl CoveyServerBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8081".to_string(),
            registry_config: RegistryConfig::default(),
            idle_timeout: Duration::from_secs(60),
        }
    }

    /// Sets the address to bind to. Port 0 picks a free port.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    /// Closes connections that send nothing for this long.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Binds the listener and builds the server around `video`.
    ///
    /// Uses `JsonCodec` over `WebSocketTransport`.
    pub async fn build<V: VideoClient>(
        self,
        video: V,
    ) -> Result<CoveyServer<V, JsonCodec>, CoveyError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: Mutex::new(TownRegistry::new(self.registry_config)),
            video,
            codec: JsonCodec,
            idle_timeout: self.idle_timeout,
            started: Instant::now(),
        });

        Ok(CoveyServer { transport, state })
    }
}

impl Default for CoveyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Covey server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct CoveyServer<V: VideoClient, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<V, C>>,
}

impl<V: VideoClient, C: Codec> CoveyServer<V, C> {
    /// Returns the address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, CoveyError> {
        Ok(self.transport.local_addr()?)
    }

    /// Runs the accept loop until the process is terminated, spawning a
    /// handler task per connection.
    pub async fn run(mut self) -> Result<(), CoveyError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "covey server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
