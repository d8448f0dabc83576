use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::auth::AuthSettings;
use crate::config::{GlobalLimit, MAX_SESSION_TTL_HOURS};
use crate::ledger::AccountStore;
use crate::notes::NoteStore;
use crate::rate_limit::RateLimiter;

/// Session token -> (username, expires_at).
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<DashMap<String, (String, Instant)>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_hours: u64) -> Self {
        Self::with_ttl(Duration::from_secs(ttl_hours.saturating_mul(3600)))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl: ttl.min(Duration::from_secs(MAX_SESSION_TTL_HOURS * 3600)),
        }
    }

    pub fn create(&self, username: String) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let expires = Instant::now() + self.ttl;
        self.inner.insert(token.clone(), (username, expires));
        token
    }

    pub fn get(&self, token: &str) -> Option<String> {
        let entry = self.inner.get(token)?;
        if entry.1 > Instant::now() {
            Some(entry.0.clone())
        } else {
            drop(entry);
            self.inner.remove(token);
            None
        }
    }

    pub fn remove(&self, token: &str) -> Option<String> {
        self.inner.remove(token).map(|(_, (username, _))| username)
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub auth: Arc<AuthSettings>,
    pub sessions: SessionStore,
    pub accounts: AccountStore,
    pub notes: NoteStore,
    pub limiter: Arc<RateLimiter>,
    pub secure_cookies: bool,
    pub global_limit: GlobalLimit,
}
