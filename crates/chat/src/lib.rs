//! Chat business logic: the ingress/egress
//! pipeline, recall/forward engine, read-receipt aggregator, conversation
//! view builder, room-membership administration, and the friend-request
//! lifecycle. Everything here is transport-agnostic — `relaychat-gateway`
//! owns the socket and calls into these services.
//!
//! One struct per concern, holding `Store`/`Notifier` handles directly
//! rather than behind a shared `AppState` god-object.

mod conversation;
mod error;
mod friends;
mod ingress;
mod membership;
pub mod ports;
mod read_receipts;
mod recall;

pub use conversation::{ConversationItem, ConversationView};
pub use error::{ChatError, PolicyReason, Result};
pub use friends::FriendsService;
pub use ingress::ChatService;
pub use membership::MembershipService;
pub use read_receipts::ReadReceiptAggregator;
pub use recall::{ForwardedMessage, RecallForwardService, RecallOutcome};
