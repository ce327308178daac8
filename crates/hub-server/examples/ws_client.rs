//! Minimal interactive client.
//!
//! Every stdin line is sent as a `broadcast` envelope; everything the hub
//! pushes back is printed.

use std::env;
use std::error::Error;

use futures::{SinkExt, StreamExt};
use hub_core::Envelope;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Where to connect: env override or default.
    let url = env::var("HUB_CLIENT_URL").unwrap_or_else(|_| "ws://127.0.0.1:1333/ws".to_string());

    println!("Connecting to {}...", url);
    let (ws, _) = connect_async(url.as_str()).await?;
    println!("Connected. Lines you type are broadcast; 'quit' to leave.\n");

    let (mut sink, mut stream) = ws.split();

    let printer = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => println!("<< {}", text),
                Ok(Message::Close(_)) => {
                    println!("server closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    eprintln!("read error: {}", e);
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            break;
        }

        // JSON goes through as-is, anything else as a string.
        let data = serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()));
        let frame = serde_json::to_string(&Envelope::broadcast(None, data))?;
        sink.send(Message::Text(frame)).await?;
    }

    sink.send(Message::Close(None)).await?;
    let _ = printer.await;
    Ok(())
}
