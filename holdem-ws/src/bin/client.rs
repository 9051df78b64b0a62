use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Probe client for manual smoke tests.
///
/// Usage:
///   client [ws://host:port/ws] name <display_name> [table_id]
///   client [ws://host:port/ws] token <session_token>
///
/// `name` identifies, optionally joins a table, and prints frames.
/// `token` reconnects an existing session and prints frames.
#[tokio::main]
async fn main() {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let url = if args.first().map(|a| a.starts_with("ws")).unwrap_or(false) {
        args.remove(0)
    } else {
        "ws://127.0.0.1:8080/ws".to_string()
    };
    let mode = args.first().cloned().unwrap_or_else(|| "name".to_string());

    let mut url = Url::parse(&url).expect("bad url");
    if mode == "token" {
        let token = args.get(1).expect("token required");
        url.query_pairs_mut().append_pair("token", token);
    }

    let (mut ws, _resp) = connect_async(url.as_str()).await.expect("connect");

    if mode == "name" {
        let name = args.get(1).cloned().unwrap_or_else(|| "probe".to_string());
        let set_name = serde_json::json!({ "type": "set_name", "payload": { "name": name } });
        ws.send(Message::Text(set_name.to_string())).await.unwrap();
    }
    let join_after_identify = args.get(2).cloned();

    let mut reads = 0;
    while reads < 200 {
        let Some(msg) = ws.next().await else { break };
        let txt = match msg {
            Ok(m) => m.to_string(),
            Err(e) => {
                eprintln!("!! {}", e);
                break;
            }
        };
        println!("<- {}", txt);
        if let Ok(v) = serde_json::from_str::<Value>(&txt) {
            if v.get("type").and_then(|t| t.as_str()) == Some("session_created") {
                if let Some(table_id) = &join_after_identify {
                    let join = serde_json::json!({
                        "type": "join_table",
                        "payload": { "tableId": table_id },
                    });
                    ws.send(Message::Text(join.to_string())).await.unwrap();
                }
            }
        }
        reads += 1;
    }
}
