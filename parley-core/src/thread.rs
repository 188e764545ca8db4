//! Per-chat conversation memory
//!
//! Tracks the repos, companies and actions mentioned recently in each chat so
//! follow-ups like "deploy it", "same for LusoTown" or "restart the other one"
//! can be rewritten into explicit instructions.
//!
//! Resolution never guesses: a chat with no recorded state gets its text back
//! unchanged, and a pronoun whose referent is unknown is left in place.

use crate::config::ThreadConfig;
use crate::entities::{trim_token, EntityCatalog};
use crate::patterns::{action_for_verb, is_command_verb};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

// ============================================
// Anaphora patterns
// ============================================

static SAME_FOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:and\s+|now\s+)?(?:do\s+)?(?:the\s+)?same\s+(?:thing\s+)?(?:for|with|on)\s+(\S+)[.!]*$")
        .expect("static regex")
});

static SAME_THING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:(?:do\s+)?(?:it|that)\s+again|again|(?:do\s+)?(?:the\s+)?same(?:\s+thing)?(?:\s+again)?)[.!]*$",
    )
    .expect("static regex")
});

static VERB_AGAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\w+)\s+(?:it\s+|that\s+)?again[.!]*$").expect("static regex")
});

static OTHER_ONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bthe\s+other\s+one\b").expect("static regex"));

static THERE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:in\s+)?there\b").expect("static regex"));

static OBJECT_PRONOUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:it|that|them)\b").expect("static regex"));

static COMPANY_PRONOUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:their|they)\b").expect("static regex"));

static ANAPHORA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:it|that|them|they|their|there|again|same|other\s+one)\b")
        .expect("static regex")
});

/// Words that may follow an object pronoun ("deploy it to prod").
const OBJECT_FOLLOWERS: &[&str] = &[
    "to", "on", "in", "and", "then", "now", "please", "for", "with", "again", "too", "first",
    "after", "asap", "immediately",
];

/// Whether `text` refers back to something said earlier.
pub fn has_anaphora(text: &str) -> bool {
    ANAPHORA.is_match(text)
}

/// Replace object-position "it"/"that"/"them" with `entity`.
///
/// A pronoun counts as an object when it is not the first word and is
/// followed by the end of the clause or a connective like "to" or "then".
/// Returns `None` when nothing was replaced.
pub fn replace_object_pronoun(text: &str, entity: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len() + entity.len());
    let mut last = 0;

    for m in OBJECT_PRONOUN.find_iter(text) {
        if text[..m.start()].trim().is_empty() || !in_object_position(&text[m.end()..]) {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        out.push_str(entity);
        last = m.end();
    }

    if last == 0 {
        return None;
    }
    out.push_str(&text[last..]);
    Some(out)
}

/// Replace possessive "their" and object-position "they" with `company`.
///
/// Subject "they" ("once they approve") is left alone. Returns `None` when
/// nothing was replaced.
pub fn replace_company_pronoun(text: &str, company: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len() + company.len());
    let mut last = 0;

    for m in COMPANY_PRONOUN.find_iter(text) {
        let possessive = m.as_str().eq_ignore_ascii_case("their");
        if !possessive
            && (text[..m.start()].trim().is_empty() || !in_object_position(&text[m.end()..]))
        {
            continue;
        }
        out.push_str(&text[last..m.start()]);
        out.push_str(company);
        last = m.end();
    }

    if last == 0 {
        return None;
    }
    out.push_str(&text[last..]);
    Some(out)
}

fn in_object_position(rest: &str) -> bool {
    match rest.split_whitespace().next() {
        None => true,
        Some(word) => {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            word.is_empty() || OBJECT_FOLLOWERS.contains(&word.as_str())
        }
    }
}

// ============================================
// Thread state
// ============================================

/// Kind of entity a mention refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionKind {
    Repo,
    Company,
    Action,
}

/// What a single chat has talked about recently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadState {
    pub last_repo: Option<String>,
    pub last_company: Option<String>,
    pub last_action: Option<String>,
    /// Most recent last, no duplicates
    pub repo_history: VecDeque<String>,
    pub last_updated: DateTime<Utc>,
}

impl ThreadState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_repo: None,
            last_company: None,
            last_action: None,
            repo_history: VecDeque::new(),
            last_updated: now,
        }
    }

    /// The repo mentioned before the most recent one.
    pub fn previous_repo(&self) -> Option<&str> {
        let len = self.repo_history.len();
        if len < 2 {
            return None;
        }
        self.repo_history.get(len - 2).map(String::as_str)
    }
}

#[derive(Default)]
struct ThreadInner {
    states: HashMap<String, ThreadState>,
    /// Chat ids, least recently active first
    lru: VecDeque<String>,
}

impl ThreadInner {
    fn touch(&mut self, chat_id: &str) {
        if let Some(pos) = self.lru.iter().position(|c| c == chat_id) {
            self.lru.remove(pos);
        }
        self.lru.push_back(chat_id.to_string());
    }

    fn remove(&mut self, chat_id: &str) -> bool {
        if let Some(pos) = self.lru.iter().position(|c| c == chat_id) {
            self.lru.remove(pos);
        }
        self.states.remove(chat_id).is_some()
    }
}

/// Store of per-chat thread state.
pub struct ConversationThreads {
    inner: Mutex<ThreadInner>,
    config: ThreadConfig,
    catalog: EntityCatalog,
}

impl ConversationThreads {
    pub fn new(config: &ThreadConfig, catalog: EntityCatalog) -> Self {
        Self {
            inner: Mutex::new(ThreadInner::default()),
            config: ThreadConfig {
                repo_history: config.repo_history.max(1),
                max_chats: config.max_chats.max(1),
                idle_minutes: config.idle_minutes,
            },
            catalog,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ThreadInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `idle_minutes = 0` disables idle expiry.
    fn is_idle(&self, state: &ThreadState, now: DateTime<Utc>) -> bool {
        if self.config.idle_minutes == 0 {
            return false;
        }
        let idle = i64::try_from(self.config.idle_minutes).unwrap_or(i64::MAX / 60_000);
        now - state.last_updated >= Duration::minutes(idle)
    }

    pub fn record_mention(&self, chat_id: &str, kind: MentionKind, value: &str) {
        self.record_mention_at(chat_id, kind, value, Utc::now());
    }

    pub fn record_mention_at(
        &self,
        chat_id: &str,
        kind: MentionKind,
        value: &str,
        now: DateTime<Utc>,
    ) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }

        let mut inner = self.lock();
        if !inner.states.contains_key(chat_id) {
            while inner.states.len() >= self.config.max_chats {
                let Some(oldest) = inner.lru.pop_front() else {
                    break;
                };
                inner.states.remove(&oldest);
                tracing::debug!(chat_id = %oldest, "Evicted conversation thread");
            }
        }

        let state = inner
            .states
            .entry(chat_id.to_string())
            .or_insert_with(|| ThreadState::new(now));

        match kind {
            MentionKind::Repo => {
                state.last_repo = Some(value.to_string());
                if let Some(pos) = state.repo_history.iter().position(|r| r == value) {
                    state.repo_history.remove(pos);
                }
                state.repo_history.push_back(value.to_string());
                while state.repo_history.len() > self.config.repo_history {
                    state.repo_history.pop_front();
                }
            }
            MentionKind::Company => state.last_company = Some(value.to_string()),
            MentionKind::Action => state.last_action = Some(value.to_lowercase()),
        }
        state.last_updated = now;
        inner.touch(chat_id);
    }

    /// Record known repos, companies and the leading command verb in `text`.
    pub fn detect_and_record(&self, chat_id: &str, text: &str) {
        self.detect_and_record_at(chat_id, text, Utc::now());
    }

    pub fn detect_and_record_at(&self, chat_id: &str, text: &str, now: DateTime<Utc>) {
        for repo in self.catalog.repos_in(text) {
            self.record_mention_at(chat_id, MentionKind::Repo, &repo, now);
        }
        for company in self.catalog.companies_in(text) {
            self.record_mention_at(chat_id, MentionKind::Company, &company, now);
        }

        let verb = text
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .find(|w| w != "please");
        if let Some(action) = verb.as_deref().and_then(action_for_verb) {
            self.record_mention_at(chat_id, MentionKind::Action, action, now);
        }
    }

    pub fn resolve_pronouns(&self, chat_id: &str, text: &str) -> String {
        self.resolve_pronouns_at(chat_id, text, Utc::now())
    }

    /// Rewrite anaphora in `text` using this chat's state as of `now`.
    pub fn resolve_pronouns_at(&self, chat_id: &str, text: &str, now: DateTime<Utc>) -> String {
        let Some(state) = self.state_at(chat_id, now) else {
            return text.to_string();
        };
        let text = text.trim();

        if let Some(caps) = SAME_FOR.captures(text) {
            if let Some(action) = &state.last_action {
                let target = trim_token(&caps[1]);
                return format!("{action} {target}");
            }
        }

        if SAME_THING.is_match(text) {
            if let Some(action) = &state.last_action {
                return match &state.last_repo {
                    Some(repo) => format!("{action} {repo}"),
                    None => action.clone(),
                };
            }
        }

        if let Some(caps) = VERB_AGAIN.captures(text) {
            let verb = &caps[1];
            if is_command_verb(verb) {
                if let Some(repo) = &state.last_repo {
                    return format!("{} {repo}", verb.to_lowercase());
                }
            }
        }

        let mut out = text.to_string();

        if let Some(other) = state.previous_repo() {
            out = OTHER_ONE.replace_all(&out, NoExpand(other)).into_owned();
        }

        if let Some(repo) = &state.last_repo {
            let in_repo = format!("in {repo}");
            out = THERE.replace_all(&out, NoExpand(&in_repo)).into_owned();
            if let Some(replaced) = replace_object_pronoun(&out, repo) {
                out = replaced;
            }
        }

        if let Some(company) = &state.last_company {
            if let Some(replaced) = replace_company_pronoun(&out, company) {
                out = replaced;
            }
        }

        if out != text {
            tracing::debug!(chat_id, from = text, to = %out, "Resolved pronouns");
        }
        out
    }

    /// Snapshot of a chat's state, if it has any that is not idle.
    pub fn state(&self, chat_id: &str) -> Option<ThreadState> {
        self.state_at(chat_id, Utc::now())
    }

    pub fn state_at(&self, chat_id: &str, now: DateTime<Utc>) -> Option<ThreadState> {
        let mut inner = self.lock();
        let idle = self.is_idle(inner.states.get(chat_id)?, now);
        if idle {
            inner.remove(chat_id);
            tracing::debug!(chat_id, "Dropped idle conversation thread");
            return None;
        }
        inner.states.get(chat_id).cloned()
    }

    /// Drop a chat's state.
    pub fn forget(&self, chat_id: &str) -> bool {
        self.lock().remove(chat_id)
    }

    /// Drop every idle chat, returning how many were removed.
    pub fn purge_idle(&self) -> usize {
        self.purge_idle_at(Utc::now())
    }

    pub fn purge_idle_at(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.lock();
        let idle: Vec<String> = inner
            .states
            .iter()
            .filter(|(_, state)| self.is_idle(state, now))
            .map(|(chat, _)| chat.clone())
            .collect();
        for chat in &idle {
            inner.remove(chat);
        }
        if !idle.is_empty() {
            tracing::info!(count = idle.len(), "Purged idle conversation threads");
        }
        idle.len()
    }

    pub fn len(&self) -> usize {
        self.lock().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.states.clear();
        inner.lru.clear();
        tracing::info!("Conversation threads cleared");
    }
}
