//! In-memory conversation sessions.

use crate::error::{LektorError, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct Exchange {
    question: String,
    answer: String,
}

#[derive(Debug)]
struct Session {
    exchanges: VecDeque<Exchange>,
    last_active: DateTime<Utc>,
}

/// Keeps the most recent exchanges of each conversation.
pub struct SessionManager {
    max_history: usize,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionManager {
    /// `max_history` is the number of question/answer exchanges kept per session.
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Session>>> {
        self.sessions
            .lock()
            .map_err(|e| LektorError::Session(format!("Failed to acquire lock: {}", e)))
    }

    /// Start a new session and return its id.
    pub fn create_session(&self) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.lock()?.insert(
            id.clone(),
            Session {
                exchanges: VecDeque::new(),
                last_active: Utc::now(),
            },
        );
        debug!("Created session {}", id);
        Ok(id)
    }

    /// Record an exchange, creating the session if the id is unknown.
    pub fn add_exchange(&self, session_id: &str, question: &str, answer: &str) -> Result<()> {
        let mut sessions = self.lock()?;
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session {
                exchanges: VecDeque::new(),
                last_active: Utc::now(),
            });

        session.exchanges.push_back(Exchange {
            question: question.to_string(),
            answer: answer.to_string(),
        });
        while session.exchanges.len() > self.max_history {
            session.exchanges.pop_front();
        }
        session.last_active = Utc::now();
        Ok(())
    }

    /// Prior conversation as `User:`/`Assistant:` lines, or `None` when empty.
    pub fn history(&self, session_id: &str) -> Result<Option<String>> {
        let sessions = self.lock()?;
        let Some(session) = sessions.get(session_id) else {
            return Ok(None);
        };
        if session.exchanges.is_empty() {
            return Ok(None);
        }

        let lines: Vec<String> = session
            .exchanges
            .iter()
            .map(|e| format!("User: {}\nAssistant: {}", e.question, e.answer))
            .collect();
        Ok(Some(lines.join("\n")))
    }

    /// Forget a session's history.
    pub fn clear(&self, session_id: &str) -> Result<()> {
        self.lock()?.remove(session_id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop sessions idle for longer than `max_idle`. Returns how many were removed.
    pub fn prune_idle(&self, max_idle: Duration) -> Result<usize> {
        let cutoff = Utc::now() - max_idle;
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, s| s.last_active >= cutoff);
        Ok(before - sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_keeps_last_exchanges() {
        let manager = SessionManager::new(2);
        let id = manager.create_session().unwrap();
        assert_eq!(manager.history(&id).unwrap(), None);

        manager.add_exchange(&id, "q1", "a1").unwrap();
        manager.add_exchange(&id, "q2", "a2").unwrap();
        manager.add_exchange(&id, "q3", "a3").unwrap();

        assert_eq!(
            manager.history(&id).unwrap().as_deref(),
            Some("User: q2\nAssistant: a2\nUser: q3\nAssistant: a3")
        );
    }

    #[test]
    fn test_unknown_session_is_created_on_write() {
        let manager = SessionManager::new(2);
        assert_eq!(manager.history("ext").unwrap(), None);

        manager.add_exchange("ext", "hi", "hello").unwrap();
        assert_eq!(manager.len(), 1);

        manager.clear("ext").unwrap();
        assert!(manager.is_empty());
    }

    #[test]
    fn test_prune_idle() {
        let manager = SessionManager::new(2);
        manager.create_session().unwrap();
        assert_eq!(manager.prune_idle(Duration::hours(1)).unwrap(), 0);
        assert_eq!(manager.prune_idle(Duration::seconds(-1)).unwrap(), 1);
    }
}
