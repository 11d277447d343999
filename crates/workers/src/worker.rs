use {
    async_trait::async_trait,
    tokio::task::JoinHandle,
    tracing::{info, warn},
};

use supportbot_protocol::WorkerRequest;

use crate::callback::CallbackClient;

/// A service that turns one question into one answer.
///
/// Answers never fail: a worker that cannot reason returns its fallback
/// text, which is delivered like any other answer.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// `source` tag on the callback.
    fn source(&self) -> &'static str;

    async fn answer(&self, req: &WorkerRequest) -> String;
}

/// Answer `req` in the background and post the result to the gateway.
pub fn spawn_job<W: Worker + ?Sized>(
    worker: std::sync::Arc<W>,
    callback: CallbackClient,
    req: WorkerRequest,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let answer = worker.answer(&req).await;
        match callback.send(req.user_id, &answer, worker.source()).await {
            Ok(()) => info!(user_id = req.user_id, source = worker.source(), "answer sent"),
            Err(e) => warn!(
                user_id = req.user_id,
                source = worker.source(),
                error = %e,
                "failed to deliver answer"
            ),
        }
    })
}
