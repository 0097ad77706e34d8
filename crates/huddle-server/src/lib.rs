//! huddle production server.
//!
//! Wraps the presence core from [`huddle_core`] with real I/O: a Quinn QUIC
//! transport, one session task per connection, and tokio as the runtime.
//! The fan-out engine stays free of transport concerns - this crate's job is
//! accepting channels, authenticating them, and shuttling frames.
//!
//! # Components
//!
//! - [`Server`]: accept loop and connection-limit enforcement
//! - [`QuicTransport`]: QUIC endpoint via Quinn
//! - [`MemoryStore`] / [`StaticTokenAuthenticator`] / [`LoggingPushSink`]:
//!   in-process stand-ins for the durable collaborators

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory_store;
mod push;
mod session;
mod token_auth;
mod transport;

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub use error::ServerError;
use huddle_core::{Authenticator, ConversationStore, FanoutEngine, PushSink};
pub use memory_store::MemoryStore;
pub use push::LoggingPushSink;
pub use session::{CLOSE_AUTH_FAILED, CLOSE_PROTOCOL, CLOSE_SERVER_FULL};
pub use token_auth::StaticTokenAuthenticator;
pub use transport::{QuicConnection, QuicTransport};

/// Limits applied to accepted connections.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How long a new channel may take to complete its handshake.
    pub handshake_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { max_connections: 10_000, handshake_timeout: Duration::from_secs(10) }
    }
}

/// Configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4455").
    pub bind_address: String,
    /// Path to TLS certificate (PEM format).
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format).
    pub key_path: Option<String>,
    /// Connection limits.
    pub limits: ServerConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4455".to_string(),
            cert_path: None,
            key_path: None,
            limits: ServerConfig::default(),
        }
    }
}

/// Production huddle server.
///
/// Owns the fan-out engine and the transport; generic over the collaborator
/// implementations so tests and deployments can inject their own.
pub struct Server<S, A, P> {
    engine: Arc<FanoutEngine<S, P>>,
    auth: Arc<A>,
    transport: QuicTransport,
    config: ServerConfig,
}

impl<S, A, P> Server<S, A, P>
where
    S: ConversationStore,
    A: Authenticator,
    P: PushSink,
{
    /// Create and bind a new server.
    pub fn bind(config: RuntimeConfig, store: S, auth: A, push: P) -> Result<Self, ServerError> {
        let transport = QuicTransport::bind(
            &config.bind_address,
            config.cert_path.as_deref(),
            config.key_path.as_deref(),
        )?;

        Ok(Self {
            engine: Arc::new(FanoutEngine::new(store, push)),
            auth: Arc::new(auth),
            transport,
            config: config.limits,
        })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// The fan-out engine, for inspection and administration.
    pub fn engine(&self) -> &Arc<FanoutEngine<S, P>> {
        &self.engine
    }

    /// Run the server, accepting connections until the endpoint closes.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("server listening on {}", self.transport.local_addr()?);

        let active = Arc::new(AtomicUsize::new(0));

        loop {
            let conn = self.transport.accept().await?;

            if active.load(Ordering::Acquire) >= self.config.max_connections {
                tracing::warn!(
                    remote = %conn.remote_addr(),
                    "max connections exceeded, rejecting connection"
                );
                conn.close(CLOSE_SERVER_FULL, b"server full");
                continue;
            }

            active.fetch_add(1, Ordering::AcqRel);

            let engine = Arc::clone(&self.engine);
            let auth = Arc::clone(&self.auth);
            let active = Arc::clone(&active);
            let handshake_timeout = self.config.handshake_timeout;

            tokio::spawn(async move {
                if let Err(e) = session::run_session(conn, engine, auth, handshake_timeout).await {
                    tracing::debug!("session ended with error: {}", e);
                }
                active.fetch_sub(1, Ordering::AcqRel);
            });
        }
    }
}
