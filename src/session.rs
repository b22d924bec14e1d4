use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Who produced a history turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Agent,
}

/// One entry in a session's conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Value,
}

impl Turn {
    pub fn user(content: Value) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    pub fn agent(content: Value) -> Self {
        Self {
            role: Role::Agent,
            content,
        }
    }
}

/// Per-session state: named step outputs plus conversation history.
///
/// Created on first contact with a session id, never implicitly deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub keyed_outputs: HashMap<String, Value>,
    pub history: Vec<Turn>,
}

impl SessionState {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            keyed_outputs: HashMap::new(),
            history: Vec::new(),
        }
    }

    /// A step output published under `key`, if any.
    pub fn output(&self, key: &str) -> Option<&Value> {
        self.keyed_outputs.get(key)
    }
}

/// Store I/O failure. The in-memory store only fails this way when a writer
/// panicked while holding the lock, or when a session id is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(String);

impl StoreError {
    pub(crate) fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store unavailable: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

/// Durable mapping from session id to session state.
///
/// Writes take the store lock per call; reads hand back snapshots.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, SessionState>>, StoreError> {
        self.sessions
            .lock()
            .map_err(|_| StoreError::new("session store lock poisoned"))
    }

    /// Atomic create-if-absent. Returns `true` if the session was created.
    pub fn create_if_absent(&self, session_id: &str) -> Result<bool, StoreError> {
        let mut sessions = self.lock()?;
        if sessions.contains_key(session_id) {
            return Ok(false);
        }
        sessions.insert(session_id.to_string(), SessionState::new(session_id));
        Ok(true)
    }

    /// Snapshot of one session's state.
    pub fn get(&self, session_id: &str) -> Result<Option<SessionState>, StoreError> {
        Ok(self.lock()?.get(session_id).cloned())
    }

    /// Publish a named step output into an existing session.
    pub fn publish_output(
        &self,
        session_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::new(format!("unknown session: {session_id}")))?;
        session.keyed_outputs.insert(key.to_string(), value);
        Ok(())
    }

    /// Append a turn to an existing session's history.
    pub fn push_turn(&self, session_id: &str, turn: Turn) -> Result<(), StoreError> {
        let mut sessions = self.lock()?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::new(format!("unknown session: {session_id}")))?;
        session.history.push(turn);
        Ok(())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_if_absent_is_idempotent() {
        let store = SessionStore::new();
        assert!(store.create_if_absent("s-1").unwrap());
        assert!(!store.create_if_absent("s-1").unwrap());
    }

    #[test]
    fn publish_then_read_output() {
        let store = SessionStore::new();
        store.create_if_absent("s-1").unwrap();
        store
            .publish_output("s-1", "outline", json!("1. intro"))
            .unwrap();

        let session = store.get("s-1").unwrap().unwrap();
        assert_eq!(session.output("outline"), Some(&json!("1. intro")));
        assert_eq!(session.output("missing"), None);
    }

    #[test]
    fn publish_to_unknown_session_errors() {
        let store = SessionStore::new();
        let err = store.publish_output("nope", "k", json!(1)).err().unwrap();
        assert!(err.to_string().contains("unknown session"));
    }

    #[test]
    fn history_keeps_turn_order() {
        let store = SessionStore::new();
        store.create_if_absent("s-1").unwrap();
        store.push_turn("s-1", Turn::user(json!("hi"))).unwrap();
        store.push_turn("s-1", Turn::agent(json!("hello"))).unwrap();

        let session = store.get("s-1").unwrap().unwrap();
        assert_eq!(session.history.len(), 2);
        assert_eq!(session.history[0].role, Role::User);
        assert_eq!(session.history[1].role, Role::Agent);
    }

    #[test]
    fn get_unknown_session_is_none() {
        let store = SessionStore::new();
        assert!(store.get("nope").unwrap().is_none());
    }
}
