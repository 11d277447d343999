use {anyhow::Context, tracing::debug};

use supportbot_protocol::{AiResponseRequest, CALLBACK_PATH, CallbackReply, UserId};

/// Posts finished answers to the gateway's callback endpoint.
#[derive(Clone)]
pub struct CallbackClient {
    client: reqwest::Client,
    url: String,
}

impl CallbackClient {
    /// `gateway_base` is the gateway's HTTP base URL.
    pub fn new(gateway_base: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}{CALLBACK_PATH}", gateway_base.trim_end_matches('/')),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver an answer. Fails when the gateway is unreachable or reports
    /// that it could not deliver (for example, the user went offline).
    pub async fn send(&self, user_id: UserId, content: &str, source: &str) -> anyhow::Result<()> {
        let body = AiResponseRequest {
            user_id,
            content: content.to_string(),
            source: source.to_string(),
        };
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("gateway callback unreachable")?;
        let status = resp.status();
        let reply: CallbackReply = resp
            .json()
            .await
            .with_context(|| format!("unexpected callback response ({status})"))?;
        if !reply.success {
            anyhow::bail!("gateway did not deliver: {}", reply.message);
        }
        debug!(user_id, source, "answer delivered to gateway");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn posts_answer_to_callback_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/ai-response/send")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "userId": 7,
                "content": "done",
                "source": "assistant",
            })))
            .with_status(200)
            .with_body(r#"{"success":true,"message":"message sent"}"#)
            .create_async()
            .await;

        let client = CallbackClient::new(&format!("{}/", server.url()));
        client.send(7, "done", "assistant").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn offline_user_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/ai-response/send")
            .with_status(500)
            .with_body(r#"{"success":false,"message":"user offline"}"#)
            .create_async()
            .await;

        let err = CallbackClient::new(&server.url())
            .send(7, "done", "assistant")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("user offline"));
    }
}
