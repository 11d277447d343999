use std::sync::Arc;

use tracing::{debug, warn};

use supportbot_protocol::{InboundMessage, ResponseFrame, UserId, decode_inbound};

use crate::{
    dispatch::{ChatJob, DispatchPool},
    registry::SessionRegistry,
    session::TransportHandle,
};

/// Identity of the connection a frame arrived on.
///
/// The user id comes from the handshake, never from a frame's `sender`.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub user_id: UserId,
    pub session_id: String,
    pub handle: TransportHandle,
}

/// Routes decoded client frames by kind.
pub struct MessageRouter {
    registry: Arc<SessionRegistry>,
    dispatch: Arc<DispatchPool>,
    ack_message: String,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        dispatch: Arc<DispatchPool>,
        ack_message: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            dispatch,
            ack_message: ack_message.into(),
        }
    }

    /// Decode and route one raw text frame. Undecodable frames are dropped.
    pub async fn route_raw(&self, ctx: &ConnectionContext, raw: &str) {
        match decode_inbound(raw) {
            Ok(msg) => self.route(ctx, msg).await,
            Err(e) => {
                warn!(user_id = ctx.user_id, session_id = %ctx.session_id, error = %e, "dropping frame");
            },
        }
    }

    pub async fn route(&self, ctx: &ConnectionContext, msg: InboundMessage) {
        match msg {
            InboundMessage::Chat(frame) => {
                if frame.content.trim().is_empty() {
                    self.reply(ctx, &ResponseFrame::err(&frame.message_id, "empty message"));
                    return;
                }
                // Ack first, on this connection; classification runs detached.
                self.reply(ctx, &ResponseFrame::ok(&frame.message_id, self.ack_message.as_str()));
                debug!(user_id = ctx.user_id, message_id = %frame.message_id, "chat accepted");
                self.dispatch.submit(ChatJob {
                    user_id: ctx.user_id,
                    message_id: frame.message_id,
                    content: frame.content,
                });
            },
            InboundMessage::Heartbeat(_) => {
                if !self.registry.touch_heartbeat(&ctx.session_id).await {
                    debug!(session_id = %ctx.session_id, "heartbeat for unregistered session");
                }
            },
            InboundMessage::Unknown(frame) => {
                warn!(
                    user_id = ctx.user_id,
                    kind = %frame.kind,
                    message_id = %frame.message_id,
                    "unknown frame type, dropping"
                );
            },
        }
    }

    fn reply(&self, ctx: &ConnectionContext, frame: &ResponseFrame) {
        match serde_json::to_string(frame) {
            Ok(json) => {
                if !ctx.handle.send(json) {
                    debug!(session_id = %ctx.session_id, "connection closed before ack");
                }
            },
            Err(e) => warn!(error = %e, "failed to encode response frame"),
        }
    }
}
