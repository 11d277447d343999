//! WebSocket client for the gateway and the request/acknowledgement
//! correlation table it uses.

pub mod client;
pub mod pending;

pub use {
    client::GatewayClient,
    pending::{PendingError, PendingReply, PendingResponses},
};
