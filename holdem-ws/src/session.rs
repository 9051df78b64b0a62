use std::collections::HashMap;
use std::sync::RwLock;
use std::time::SystemTime;

use uuid::Uuid;

/// A reconnectable identity. The token is the only credential: whoever
/// presents it owns the session's name and seat.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub name: String,
    pub table_id: Option<String>,
    pub seat_index: Option<usize>,
    pub created_at: SystemTime,
}

/// Registry of all sessions, behind one reader-writer lock. Nothing in here
/// suspends, so it is safe to use from async handlers.
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
}

/// Display names: trimmed, 1..=20 chars of `[A-Za-z0-9 _-]`.
pub fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 20
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '-')
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a session with a fresh 128-bit token.
    pub fn create(&self, name: &str) -> Result<Session, String> {
        let name = name.trim();
        if !valid_name(name) {
            return Err("invalid name".to_string());
        }
        let session = Session {
            token: Uuid::new_v4().to_string(),
            name: name.to_string(),
            table_id: None,
            seat_index: None,
            created_at: SystemTime::now(),
        };
        self.sessions
            .write()
            .unwrap()
            .insert(session.token.clone(), session.clone());
        Ok(session)
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.sessions.read().unwrap().get(token).cloned()
    }

    /// Sets both seat-binding fields at once; `None` clears.
    pub fn update(
        &self,
        token: &str,
        table_id: Option<String>,
        seat_index: Option<usize>,
    ) -> Option<Session> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions.get_mut(token)?;
        session.table_id = table_id;
        session.seat_index = seat_index;
        Some(session.clone())
    }

    pub fn remove(&self, token: &str) -> bool {
        self.sessions.write().unwrap().remove(token).is_some()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }
}
