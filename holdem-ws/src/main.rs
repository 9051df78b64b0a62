use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tower_http::services::ServeDir;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use holdem_ws::{Server, ServerConfig};

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(server): State<Arc<Server>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, server, params.token))
}

async fn handle_socket(socket: WebSocket, server: Arc<Server>, token: Option<String>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let conn = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<String>(server.config.queue_capacity);
    server.hub.register(conn, tx);
    info!(conn = %conn, "client connected");

    // Writer task: drains the bounded queue onto the socket. It exits when
    // the hub drops this client's sender.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if ws_tx.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    // With a token the boot handshake runs before any reads; an unknown
    // token gets its error flushed, then the channel closes.
    if let Some(token) = token {
        if !server.restore(conn, &token).await {
            sleep(server.config.close_grace).await;
            server.hub.unregister(conn);
            let _ = writer.await;
            info!(conn = %conn, "rejected unknown token");
            return;
        }
    }

    // Reader loop: one inbound frame at a time, dispatched under whatever
    // locks the message needs.
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => server.dispatch(conn, &text).await,
            Message::Close(_) => break,
            _ => {}
        }
    }

    server.handle_disconnect(conn).await;
    let _ = writer.await;
    info!(conn = %conn, "client disconnected");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let server = Arc::new(Server::new(ServerConfig::from_env()));
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .nest_service("/", ServeDir::new("public"))
        .with_state(server.clone());

    let addr: SocketAddr = server.config.addr.parse().unwrap();
    info!(%addr, tables = server.config.table_count, "starting server");
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
