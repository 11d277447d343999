use std::{sync::Arc, time::Duration};

use {
    anyhow::Context,
    futures::{SinkExt, StreamExt},
    tokio::sync::{Mutex, mpsc},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    supportbot_config::ClientConfig,
    supportbot_protocol::{
        AiResponseFrame, InboundFrame, OutboundMessage, ResponseFrame, UserId, decode_outbound,
    },
};

use crate::pending::{PendingError, PendingResponses};

/// A user's WebSocket connection to the gateway.
///
/// Three tasks back each client: a writer draining the outbound queue, a
/// reader resolving acknowledgements and forwarding `AI_RESPONSE` frames,
/// and a heartbeat sender. All stop when the client is closed or dropped.
pub struct GatewayClient {
    user_id: UserId,
    outbound: mpsc::UnboundedSender<String>,
    pending: Arc<PendingResponses>,
    answers: Mutex<mpsc::UnboundedReceiver<AiResponseFrame>>,
    cancel: CancellationToken,
}

impl GatewayClient {
    /// Connect with default timeouts. `url` is the gateway's `/ws` endpoint.
    pub async fn connect(url: &str, user_id: UserId) -> anyhow::Result<Self> {
        Self::connect_with(url, user_id, &ClientConfig::default()).await
    }

    pub async fn connect_with(
        url: &str,
        user_id: UserId,
        cfg: &ClientConfig,
    ) -> anyhow::Result<Self> {
        let sep = if url.contains('?') { '&' } else { '?' };
        let full_url = format!("{url}{sep}uid={user_id}");
        let (ws, _) = connect_async(full_url.as_str())
            .await
            .with_context(|| format!("failed to connect to {full_url}"))?;
        info!(user_id, url = %full_url, "connected to gateway");

        let (mut sink, mut stream) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (answers_tx, answers_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(PendingResponses::new(Duration::from_secs(
            cfg.response_timeout_secs,
        )));
        let cancel = CancellationToken::new();

        // Writer.
        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_cancel.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    },
                    frame = outbound_rx.recv() => {
                        let Some(frame) = frame else { break };
                        if let Err(e) = sink.send(Message::text(frame)).await {
                            warn!(error = %e, "gateway write failed");
                            writer_cancel.cancel();
                            break;
                        }
                    },
                }
            }
        });

        // Reader.
        let reader_cancel = cancel.clone();
        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    next = stream.next() => next,
                };
                match next {
                    Some(Ok(Message::Text(text))) => match decode_outbound(text.as_str()) {
                        Ok(OutboundMessage::Response(frame)) => {
                            reader_pending.resolve(frame).await;
                        },
                        Ok(OutboundMessage::AiResponse(frame)) => {
                            debug!(message_id = %frame.message_id, "ai response received");
                            if answers_tx.send(frame).is_err() {
                                debug!("ai response dropped, no listener");
                            }
                        },
                        Ok(OutboundMessage::Unknown(value)) => {
                            debug!(frame = %value, "ignoring unrecognised frame");
                        },
                        Err(e) => warn!(error = %e, "undecodable frame from gateway"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("gateway closed the connection");
                        break;
                    },
                    Some(Ok(_)) => {},
                    Some(Err(e)) => {
                        warn!(error = %e, "gateway read failed");
                        break;
                    },
                }
            }
            reader_cancel.cancel();
            reader_pending.cancel_all().await;
        });

        // Heartbeats.
        let heartbeat_cancel = cancel.clone();
        let heartbeat_tx = outbound.clone();
        let period = Duration::from_secs(cfg.heartbeat_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = heartbeat_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let Ok(frame) = serde_json::to_string(&InboundFrame::heartbeat(user_id)) else {
                            continue;
                        };
                        if heartbeat_tx.send(frame).is_err() {
                            break;
                        }
                        debug!(user_id, "heartbeat sent");
                    },
                }
            }
        });

        Ok(Self {
            user_id,
            outbound,
            pending,
            answers: Mutex::new(answers_rx),
            cancel,
        })
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Send a chat message and wait for the gateway's acknowledgement.
    pub async fn send_chat(&self, content: &str) -> Result<ResponseFrame, PendingError> {
        let message_id = uuid::Uuid::new_v4().to_string();
        let reply = self.pending.register(&message_id).await?;
        let frame = InboundFrame::chat(message_id.as_str(), content, self.user_id);
        let sent = serde_json::to_string(&frame)
            .ok()
            .is_some_and(|json| !self.cancel.is_cancelled() && self.outbound.send(json).is_ok());
        if !sent {
            self.pending.cancel(&message_id).await;
            return Err(PendingError::TransportWriteFailure);
        }
        self.pending.wait(reply).await
    }

    /// Send one heartbeat now, outside the periodic schedule.
    pub fn send_heartbeat(&self) -> bool {
        serde_json::to_string(&InboundFrame::heartbeat(self.user_id))
            .ok()
            .is_some_and(|json| self.outbound.send(json).is_ok())
    }

    /// Next worker answer pushed by the gateway. `None` once the connection
    /// has closed and every buffered answer was taken.
    pub async fn next_ai_response(&self) -> Option<AiResponseFrame> {
        self.answers.lock().await.recv().await
    }

    /// Requests still waiting for an acknowledgement.
    pub async fn pending_count(&self) -> usize {
        self.pending.len().await
    }

    pub async fn close(&self) {
        self.cancel.cancel();
        self.pending.cancel_all().await;
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
