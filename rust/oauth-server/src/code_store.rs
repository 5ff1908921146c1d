//! One-time authorization codes handed out by `/auth` and redeemed by `/token`.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use rand::{distributions::Alphanumeric, Rng};
use tokio::time::Instant;

const CODE_LENGTH: usize = 32;

#[derive(Debug)]
struct Grant {
    principal: String,
    issued_at: Instant,
}

/// Pending authorization codes, each bound to the principal that logged in.
///
/// Every operation holds the lock for a single map operation, so a code can only ever be
/// redeemed once, even under concurrent `/token` requests.
#[derive(Debug)]
pub struct CodeStore {
    ttl: Duration,
    grants: Mutex<HashMap<String, Grant>>,
}

impl CodeStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            grants: Mutex::new(HashMap::new()),
        }
    }

    fn grants(&self) -> MutexGuard<HashMap<String, Grant>> {
        // The map is valid after any panic, so poisoning can be ignored
        self.grants.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issues a fresh code for `principal`.
    pub fn issue(&self, principal: &str) -> String {
        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CODE_LENGTH)
            .map(char::from)
            .collect();
        self.grants().insert(
            code.clone(),
            Grant {
                principal: principal.to_string(),
                issued_at: Instant::now(),
            },
        );
        code
    }

    /// Consumes `code`, returning the principal it was issued to.
    ///
    /// Returns `None` for unknown, already redeemed, or expired codes.
    pub fn redeem(&self, code: &str) -> Option<String> {
        let grant = self.grants().remove(code)?;
        if grant.issued_at.elapsed() > self.ttl {
            tracing::debug!("rejecting expired authorization code");
            return None;
        }
        Some(grant.principal)
    }

    /// Drops all expired codes, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let mut grants = self.grants();
        let before = grants.len();
        grants.retain(|_, grant| grant.issued_at.elapsed() <= self.ttl);
        before - grants.len()
    }

    pub fn len(&self) -> usize {
        self.grants().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweeps every half TTL (at least once per second), forever.
    pub async fn run_sweeper(&self) {
        let period = (self.ttl / 2).max(Duration::from_secs(1));
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let swept = self.sweep();
            if swept > 0 {
                tracing::debug!(swept, "evicted expired authorization codes");
            }
        }
    }
}
