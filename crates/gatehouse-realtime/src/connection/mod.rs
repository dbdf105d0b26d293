//! Hub connection management: lifecycle, pool, handles, liveness, auth and the socket driver.

pub mod authenticator;
pub mod driver;
pub mod handle;
pub mod heartbeat;
pub mod manager;
pub mod pool;

pub use authenticator::WsAuthenticator;
pub use driver::{WsFrame, serve_connection};
pub use handle::{AuthenticatedClient, ConnectionHandle};
pub use heartbeat::HeartbeatConfig;
pub use manager::ConnectionManager;
