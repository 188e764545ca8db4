//! Bounded per-user action history.

use crate::config::HistoryConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct HistoryInner {
    users: HashMap<String, VecDeque<String>>,
    /// User ids, least recently active first
    lru: VecDeque<String>,
}

/// Recent actions per user, capped per user and across users.
pub struct UserHistory {
    inner: Mutex<HistoryInner>,
    max_actions: usize,
    max_users: usize,
}

impl UserHistory {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            inner: Mutex::new(HistoryInner::default()),
            max_actions: config.max_actions_per_user.max(1),
            max_users: config.max_users.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HistoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, user_id: &str, action: &str) {
        let mut inner = self.lock();

        if !inner.users.contains_key(user_id) {
            while inner.users.len() >= self.max_users {
                let Some(oldest) = inner.lru.pop_front() else {
                    break;
                };
                inner.users.remove(&oldest);
            }
        }

        let actions = inner.users.entry(user_id.to_string()).or_default();
        actions.push_back(action.to_lowercase());
        while actions.len() > self.max_actions {
            actions.pop_front();
        }

        if let Some(pos) = inner.lru.iter().position(|u| u == user_id) {
            inner.lru.remove(pos);
        }
        inner.lru.push_back(user_id.to_string());
    }

    /// A user's actions, oldest first.
    pub fn actions(&self, user_id: &str) -> Vec<String> {
        self.lock()
            .users
            .get(user_id)
            .map(|a| a.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last_action(&self, user_id: &str) -> Option<String> {
        self.lock()
            .users
            .get(user_id)
            .and_then(|a| a.back().cloned())
    }

    /// How strongly the user's history supports `action`, in [0, 1].
    ///
    /// 1.0 when it was the last thing they did, otherwise the share of
    /// remembered actions that match.
    pub fn factor(&self, user_id: &str, action: &str) -> f64 {
        let inner = self.lock();
        let Some(actions) = inner.users.get(user_id) else {
            return 0.0;
        };
        if actions.back().is_some_and(|a| a == action) {
            return 1.0;
        }
        if actions.is_empty() {
            return 0.0;
        }
        let matching = actions.iter().filter(|a| *a == action).count();
        matching as f64 / actions.len() as f64
    }

    /// Number of tracked users.
    pub fn len(&self) -> usize {
        self.lock().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.users.clear();
        inner.lru.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(max_actions_per_user: usize, max_users: usize) -> UserHistory {
        UserHistory::new(&HistoryConfig {
            max_actions_per_user,
            max_users,
        })
    }

    #[test]
    fn per_user_cap_drops_oldest() {
        let history = history(3, 10);
        for action in ["deploy", "status", "logs", "test"] {
            history.record("u1", action);
        }
        assert_eq!(history.actions("u1"), vec!["status", "logs", "test"]);
        assert_eq!(history.last_action("u1").as_deref(), Some("test"));
    }

    #[test]
    fn user_cap_evicts_least_recent() {
        let history = history(5, 2);
        history.record("u1", "deploy");
        history.record("u2", "deploy");
        history.record("u1", "status");
        history.record("u3", "logs");

        assert_eq!(history.len(), 2);
        assert!(history.actions("u2").is_empty());
        assert_eq!(history.actions("u1").len(), 2);
    }

    #[test]
    fn factor_prefers_last_action() {
        let history = history(10, 10);
        assert_eq!(history.factor("u1", "deploy"), 0.0);

        history.record("u1", "deploy");
        history.record("u1", "status");
        history.record("u1", "status");
        history.record("u1", "logs");

        assert_eq!(history.factor("u1", "logs"), 1.0);
        assert_eq!(history.factor("u1", "status"), 0.5);
        assert_eq!(history.factor("u1", "restart"), 0.0);
    }
}
