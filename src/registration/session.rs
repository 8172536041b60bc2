//! Per-user registration sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use super::model::Answers;
use super::skills::SkillSelection;
use super::state::FlowState;

/// One user's registration attempt.
///
/// `state` is the single source of truth for routing; a session is active
/// exactly when its state is not [`FlowState::Idle`].
#[derive(Debug, Clone)]
pub struct Session {
    pub state: FlowState,
    pub answers: Answers,
    /// Skills being toggled; only written to `answers` on "done".
    pub skills: SkillSelection,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            state: FlowState::Idle,
            answers: Answers::default(),
            skills: SkillSelection::default(),
            started_at: now,
            updated_at: now,
        }
    }
}

impl Session {
    /// A fresh attempt positioned at the first question.
    pub fn begin() -> Self {
        Self {
            state: FlowState::first(),
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Drop everything collected and return to the menu.
    pub fn reset_to_idle(&mut self) {
        *self = Self::default();
    }

    /// Discard the attempt and start over at the first question.
    pub fn restart(&mut self) {
        *self = Self::begin();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Session repository keyed by user identifier.
///
/// Each session sits behind its own mutex; holding it for the duration of an
/// event keeps two events for the same user from interleaving while other
/// users proceed.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the session handle for `user_id`, creating an idle one if needed.
    pub async fn session(&self, user_id: &str) -> Arc<Mutex<Session>> {
        if let Some(existing) = self.sessions.read().await.get(user_id) {
            return Arc::clone(existing);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Session::default()))),
        )
    }

    /// Snapshot of the user's session, if one exists.
    pub async fn get(&self, user_id: &str) -> Option<Session> {
        let handle = self.sessions.read().await.get(user_id).cloned()?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// Replace the user's session.
    pub async fn put(&self, user_id: &str, session: Session) {
        let handle = self.session(user_id).await;
        *handle.lock().await = session;
    }

    /// Reset the user's session to idle, discarding collected answers.
    pub async fn clear(&self, user_id: &str) {
        let handle = self.sessions.read().await.get(user_id).cloned();
        if let Some(handle) = handle {
            handle.lock().await.reset_to_idle();
        }
    }

    /// Remove sessions untouched for longer than `max_idle`. Returns how many
    /// were removed.
    ///
    /// A session whose handle is held outside the store is kept even if it is
    /// stale and unlocked: its holder is about to lock it, and removing it
    /// would leave that event writing to an orphan.
    pub async fn prune_idle(&self, max_idle: Duration) -> usize {
        let max_idle =
            chrono::Duration::from_std(max_idle).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let cutoff = Utc::now() - max_idle;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| {
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            match handle.try_lock() {
                Ok(session) => session.updated_at >= cutoff,
                Err(_) => true,
            }
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Number of sessions with a registration in progress.
    pub async fn active_count(&self) -> usize {
        let handles: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut count = 0;
        for handle in handles {
            if handle.lock().await.is_active() {
                count += 1;
            }
        }
        count
    }
}
