use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// One connected client: its outbound queue and, once identified, the
/// session token it speaks for.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub id: Uuid,
    pub token: Option<String>,
    tx: mpsc::Sender<String>,
}

impl ClientHandle {
    /// Enqueues without blocking. A full or closed queue drops the frame for
    /// this client only; the hand must never wait on a slow reader.
    fn push(&self, frame: String) {
        if let Err(e) = self.tx.try_send(frame) {
            warn!(conn = %self.id, error = %e, "dropping outbound frame");
        }
    }
}

/// The set of connected clients. Fan-out iterates under the shared lock so a
/// broadcast is never torn by a concurrent register/unregister.
#[derive(Debug, Default)]
pub struct Hub {
    clients: RwLock<HashMap<Uuid, ClientHandle>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: Uuid, tx: mpsc::Sender<String>) {
        self.clients
            .write()
            .unwrap()
            .insert(id, ClientHandle { id, token: None, tx });
    }

    pub fn unregister(&self, id: Uuid) {
        self.clients.write().unwrap().remove(&id);
    }

    /// Associates an identified session with the connection.
    pub fn bind_token(&self, id: Uuid, token: &str) {
        if let Some(client) = self.clients.write().unwrap().get_mut(&id) {
            client.token = Some(token.to_string());
        }
    }

    pub fn token_of(&self, id: Uuid) -> Option<String> {
        self.clients
            .read()
            .unwrap()
            .get(&id)
            .and_then(|c| c.token.clone())
    }

    pub fn send_to(&self, id: Uuid, frame: String) {
        if let Some(client) = self.clients.read().unwrap().get(&id) {
            client.push(frame);
        }
    }

    /// Sends the same frame to every client, optionally excluding one
    /// connection (typically the originator, who already got a directed
    /// reply).
    pub fn broadcast(&self, frame: &str, exclude: Option<Uuid>) {
        for client in self.clients.read().unwrap().values() {
            if Some(client.id) == exclude {
                continue;
            }
            client.push(frame.to_string());
        }
    }

    /// Per-recipient fan-out: the closure renders (or withholds) a frame for
    /// each client. This is the privacy-filtering path.
    pub fn broadcast_with<F>(&self, render: F)
    where
        F: Fn(&ClientHandle) -> Option<String>,
    {
        for client in self.clients.read().unwrap().values() {
            if let Some(frame) = render(client) {
                client.push(frame);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
