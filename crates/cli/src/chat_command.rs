use {
    anyhow::Context,
    tokio::io::{AsyncBufReadExt, BufReader},
};

use {supportbot_client::GatewayClient, supportbot_config::ClientConfig};

/// Interactive session: each stdin line is sent as a chat message; acks and
/// pushed answers are printed as they arrive.
pub async fn run_chat(url: &str, uid: i64, cfg: &ClientConfig) -> anyhow::Result<()> {
    let client = GatewayClient::connect_with(url, uid, cfg)
        .await
        .with_context(|| format!("could not reach gateway at {url}"))?;
    println!("connected as user {uid}. Type a message, or /quit to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "/quit" {
                    break;
                }
                match client.send_chat(line).await {
                    Ok(ack) => println!("[ack] {}", ack.message),
                    Err(e) => eprintln!("[error] {e}"),
                }
            },
            answer = client.next_ai_response() => {
                let Some(answer) = answer else {
                    eprintln!("connection closed by gateway");
                    break;
                };
                println!("[{}] {}", answer.sender_name, answer.content);
            },
        }
    }

    client.close().await;
    Ok(())
}
