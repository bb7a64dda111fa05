use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::principal::Principal;
use crate::error::{AppError, AppResult, StoreError};
use crate::storage::Database;

pub const SESSIONS_COLLECTION: &str = "sessions";

/// Server-side session record, stored in the `sessions` collection under its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub principal: Principal,
    pub created_at: DateTime<Utc>,
    pub last_sync: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

fn gen_id() -> Result<String, getrandom::Error> {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Issues and revokes sessions against a request's database handle.
pub struct SessionManager {
    pub ttl: Duration,
}

impl Default for SessionManager {
    fn default() -> Self { Self { ttl: Duration::from_secs(24 * 60 * 60) } }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self { Self { ttl } }

    pub fn issue(&self, db: &Database, principal: Principal) -> AppResult<Session> {
        let id = gen_id().map_err(|e| AppError::internal("rng_error".to_string(), e.to_string()))?;
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let session = Session {
            id,
            principal,
            created_at: now,
            last_sync: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        db.upsert_as(SESSIONS_COLLECTION, &session.id, &session)?;
        debug!(user = %session.principal.user_id, ttl_secs = self.ttl.as_secs(), "session.issue");
        Ok(session)
    }

    /// Delete a session record. Returns false if it was already gone.
    pub fn revoke(&self, db: &Database, session_id: &str) -> Result<bool, StoreError> {
        let removed = db.remove(SESSIONS_COLLECTION, session_id)?;
        debug!(removed, "session.revoke");
        Ok(removed)
    }
}
