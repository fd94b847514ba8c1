//! Session hub and per-user session state (§4.2, C3).
//!
//! The hub owns connection registration and fan-out only; it knows nothing
//! about WebSocket frames or HTTP. The transport (`relaychat-gateway`) holds
//! the socket, reads inbound frames, and drives [`batching::recv_batch`]
//! over the bounded queue this crate hands it at `attach`.

mod batching;
mod hub;
mod user_state;

pub use batching::recv_batch;
pub use hub::{AttachOutcome, SessionHub};
pub use user_state::{IdentitySnapshot, UserSession};
