use supportbot_protocol::UserId;

/// Delivery failures reported by the session registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// No live session for the target user.
    #[error("user {0} is offline")]
    UserOffline(UserId),
    /// The write to a live session failed; the session has been torn down.
    #[error("write to user {user_id} (session {session_id}) failed")]
    TransportWriteFailure { user_id: UserId, session_id: String },
    #[error("failed to encode frame: {0}")]
    Encode(String),
}
