use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use query_bridge::bridge::Message;

#[derive(Parser)]
#[command(name = "bridge-cli")]
#[command(about = "Client and test peer for the query bridge", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:9863")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue one query and print the peer's answer
    Query {
        #[arg(long, default_value = "/query")]
        path: String,
    },
    /// Show connection and correlation state
    Status {
        #[arg(long, default_value = "/status")]
        path: String,
    },
    /// Act as the backend peer, answering every query with fixed data
    Peer {
        #[arg(long, default_value = "/backend-connect")]
        path: String,

        /// JSON document returned as the answer's data.
        #[arg(long, default_value = "{}")]
        data: String,

        /// Delay before reconnecting after the connection drops.
        #[arg(long, default_value_t = 3000)]
        retry_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Query { path } => {
            let res = client.get(format!("{}{}", cli.url, path)).send().await?;
            print_response(res).await?;
        }
        Commands::Status { path } => {
            let res = client.get(format!("{}{}", cli.url, path)).send().await?;
            print_response(res).await?;
        }
        Commands::Peer { path, data, retry_ms } => {
            let data: Value = serde_json::from_str(&data)?;
            let ws_url = format!("{}{}", websocket_base(&cli.url), path);
            run_peer(&ws_url, &data, Duration::from_millis(retry_ms)).await;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: bridge returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn websocket_base(http_url: &str) -> String {
    if let Some(rest) = http_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = http_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        http_url.to_string()
    }
}

/// Keep a peer connection up until Ctrl+C.
async fn run_peer(ws_url: &str, data: &Value, retry: Duration) {
    loop {
        tokio::select! {
            _ = serve_connection(ws_url, data) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("Peer stopped");
                return;
            }
        }
        println!("Connection closed, reconnecting in {}ms", retry.as_millis());
        tokio::time::sleep(retry).await;
    }
}

async fn serve_connection(ws_url: &str, data: &Value) {
    let (mut socket, _) = match tokio_tungstenite::connect_async(ws_url).await {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("Failed to connect to {}: {}", ws_url, e);
            return;
        }
    };
    println!("Connected to {}", ws_url);

    while let Some(frame) = socket.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                eprintln!("Read error: {}", e);
                break;
            }
        };

        let message: Message = match serde_json::from_str(text.as_str()) {
            Ok(message) => message,
            // Unknown message types fail here too.
            Err(_) => {
                eprintln!("Invalid message: {}", text.as_str());
                continue;
            }
        };
        let answer = serde_json::json!({ "data": data, "echo": message.echo });
        if let Err(e) = socket.send(WsMessage::text(answer.to_string())).await {
            eprintln!("Write error: {}", e);
            break;
        }
    }
}
