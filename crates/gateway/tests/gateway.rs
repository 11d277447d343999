use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    tokio::net::TcpStream,
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async,
        tungstenite::{Error as WsError, Message},
    },
};

use {
    supportbot_config::SupportbotConfig,
    supportbot_gateway::{ChatDispatcher, ChatJob, GatewayState, serve},
    supportbot_protocol::{InboundFrame, OutboundMessage, ResponseFrame, decode_outbound},
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Default)]
struct Recorder(Mutex<Vec<ChatJob>>);

#[async_trait]
impl ChatDispatcher for Recorder {
    async fn dispatch(&self, job: &ChatJob) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(job.clone());
        Ok(())
    }
}

struct TestGateway {
    addr: SocketAddr,
    state: Arc<GatewayState>,
    recorder: Arc<Recorder>,
}

impl TestGateway {
    async fn start() -> Self {
        let mut config = SupportbotConfig::default();
        config.gateway.ack_message = "received".into();
        config.gateway.assistant_name = "Helper".into();
        let recorder = Arc::new(Recorder::default());
        let state = GatewayState::with_dispatcher(&config, recorder.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Arc::clone(&state)));
        Self {
            addr,
            state,
            recorder,
        }
    }

    async fn connect(&self, uid: &str) -> Client {
        let (ws, _) = connect_async(format!("ws://{}/ws?uid={uid}", self.addr))
            .await
            .unwrap();
        ws
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    async fn wait_online(&self, expected: usize) {
        for _ in 0..100 {
            if self.state.registry.count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {expected} online users");
    }
}

async fn next_frame(ws: &mut Client) -> OutboundMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return decode_outbound(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn chat_is_acked_and_answer_is_pushed() {
    let gw = TestGateway::start().await;
    let mut ws = gw.connect("7").await;
    gw.wait_online(1).await;

    let frame = InboundFrame::chat("m-1", "where is my order?", 7);
    ws.send(Message::text(serde_json::to_string(&frame).unwrap()))
        .await
        .unwrap();

    assert_eq!(
        next_frame(&mut ws).await,
        OutboundMessage::Response(ResponseFrame::ok("m-1", "received"))
    );

    for _ in 0..100 {
        if !gw.recorder.0.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(gw.recorder.0.lock().unwrap()[0].content, "where is my order?");

    let resp = reqwest::Client::new()
        .post(gw.url("/api/ai-response/send"))
        .json(&serde_json::json!({"userId": 7, "content": "It ships today.", "source": "assistant"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);

    let OutboundMessage::AiResponse(ai) = next_frame(&mut ws).await else {
        panic!("expected AI_RESPONSE");
    };
    assert_eq!(ai.content, "It ships today.");
    assert_eq!(ai.sender_name, "Helper");
    assert_eq!(ai.sender, 0);
}

#[tokio::test]
async fn callback_for_offline_user_fails() {
    let gw = TestGateway::start().await;
    let resp = reqwest::Client::new()
        .post(gw.url("/api/ai-response/send"))
        .json(&serde_json::json!({"userId": 404, "content": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn malformed_callback_is_rejected() {
    let gw = TestGateway::start().await;
    let resp = reqwest::Client::new()
        .post(gw.url("/api/ai-response/send"))
        .header("content-type", "application/json")
        .body(r#"{"content": "no user"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn invalid_uid_is_refused() {
    let gw = TestGateway::start().await;
    let err = connect_async(format!("ws://{}/ws?uid=abc", gw.addr))
        .await
        .unwrap_err();
    match err {
        WsError::Http(resp) => assert_eq!(resp.status(), 400),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(gw.state.registry.count().await, 0);
}

#[tokio::test]
async fn reconnect_replaces_previous_connection() {
    let gw = TestGateway::start().await;
    let mut first = gw.connect("9").await;
    gw.wait_online(1).await;
    let first_session = gw.state.registry.session_id_of(9).await.unwrap();

    let mut second = gw.connect("9").await;
    for _ in 0..100 {
        if gw.state.registry.session_id_of(9).await.as_ref() != Some(&first_session) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_ne!(gw.state.registry.session_id_of(9).await.unwrap(), first_session);
    assert_eq!(gw.state.registry.count().await, 1);

    // The superseded socket is closed by the gateway.
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    // The surviving connection still works.
    let frame = InboundFrame::chat("m-2", "hi", 9);
    second
        .send(Message::text(serde_json::to_string(&frame).unwrap()))
        .await
        .unwrap();
    assert!(matches!(
        next_frame(&mut second).await,
        OutboundMessage::Response(ResponseFrame { success: true, .. })
    ));
    assert_eq!(gw.state.registry.count().await, 1);
}

#[tokio::test]
async fn disconnect_unregisters_and_health_reports_count() {
    let gw = TestGateway::start().await;
    let mut ws = gw.connect("3").await;
    gw.wait_online(1).await;

    let health: serde_json::Value = reqwest::get(gw.url("/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "UP");
    assert_eq!(health["online_users"], 1);

    ws.close(None).await.unwrap();
    gw.wait_online(0).await;
}
