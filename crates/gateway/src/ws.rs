use std::{net::SocketAddr, sync::Arc};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, StreamExt},
    tracing::{debug, info, warn},
};

use supportbot_protocol::UserId;

use crate::{router::ConnectionContext, session::TransportHandle, state::GatewayState};

/// Drive one upgraded WebSocket until either side closes it.
///
/// The connection registers itself, feeds every text frame to the router,
/// and on exit removes its own session (by session id, so a newer
/// connection for the same user survives).
pub async fn handle_connection(
    socket: WebSocket,
    state: Arc<GatewayState>,
    user_id: UserId,
    remote_addr: Option<SocketAddr>,
) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let (handle, mut outbound) = TransportHandle::channel();
    let cancel = handle.cancellation();

    state
        .registry
        .register(
            user_id,
            handle.clone(),
            session_id.clone(),
            remote_addr.map(|a| a.to_string()),
        )
        .await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Write loop: drains the handle's queue; closing the handle closes the socket.
    let writer_cancel = cancel.clone();
    let writer_session = session_id.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                },
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                        warn!(session_id = %writer_session, error = %e, "websocket write failed");
                        writer_cancel.cancel();
                        break;
                    }
                },
            }
        }
    });

    let ctx = ConnectionContext {
        user_id,
        session_id: session_id.clone(),
        handle,
    };
    let shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(user_id, session_id = %session_id, "connection closed by gateway");
                break;
            },
            _ = shutdown.cancelled() => break,
            next = ws_rx.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    state.router.route_raw(&ctx, text.as_str()).await;
                },
                Some(Ok(Message::Close(_))) | None => {
                    debug!(user_id, session_id = %session_id, "client closed connection");
                    break;
                },
                Some(Ok(Message::Binary(_))) => {
                    warn!(user_id, "binary frames are not supported, dropping");
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    warn!(user_id, session_id = %session_id, error = %e, "websocket read failed");
                    break;
                },
            },
        }
    }

    state.registry.remove_by_session_id(&session_id).await;
    ctx.handle.close();
    let _ = writer.await;
    info!(user_id, session_id = %session_id, "connection finished");
}
