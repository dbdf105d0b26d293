//! Hub wire format: outbound envelopes and inbound control frames.

pub mod envelope;
pub mod serializer;
pub mod types;
pub mod validator;

pub use envelope::{EnvelopeMeta, HubEvent, MessageEnvelope};
pub use types::{ControlAction, ControlFrame};
