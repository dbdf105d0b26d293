//! # gatehouse-realtime
//!
//! Realtime hub for Gatehouse. Provides:
//!
//! - One JWT-authenticated WebSocket connection per browser client
//! - Stream multiplexing with subscribe/unsubscribe control frames
//! - Non-blocking broadcast primitives (per user, per user set, per stream)
//! - Slow-consumer backpressure: a full outbound queue disconnects the client
//! - Server-initiated ping/pong liveness
//! - Connection lifecycle events for components that track presence
//!
//! The hub knows nothing about remote sessions; it only moves envelopes.

pub mod connection;
pub mod error;
pub mod message;
pub mod metrics;
pub mod server;
pub mod stream;

pub use connection::driver::WsFrame;
pub use connection::handle::AuthenticatedClient;
pub use connection::manager::{ConnectionEvent, ConnectionManager, DisconnectReason};
pub use error::HubError;
pub use message::{HubEvent, MessageEnvelope};
pub use server::{AcceptedConnection, RealtimeHub};
pub use stream::{StreamAccess, StreamName, StreamRegistry};
