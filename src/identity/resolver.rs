use axum::http::HeaderMap;
use chrono::Utc;

use super::cookie::SessionCookie;
use super::session::{Session, SESSIONS_COLLECTION};
use crate::error::StoreError;
use crate::storage::Database;

/// Result of resolving a request's session.
///
/// `Absent` covers every expected case (no cookie, unreadable cookie, unknown or
/// expired session). `Failed` is reserved for the store itself misbehaving and must
/// never be treated as anonymous access.
#[derive(Debug)]
pub enum SessionOutcome {
    Valid(Session),
    Absent,
    Failed(StoreError),
}

#[derive(Debug, Clone)]
pub struct SessionResolver {
    cookie_name: String,
}

impl SessionResolver {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self { cookie_name: cookie_name.into() }
    }

    pub fn cookie_name(&self) -> &str { &self.cookie_name }

    pub fn resolve(&self, headers: &HeaderMap, db: &Database) -> SessionOutcome {
        let Some(cookie) = SessionCookie::from_headers(headers, &self.cookie_name) else {
            return SessionOutcome::Absent;
        };
        match db.find_as::<Session>(SESSIONS_COLLECTION, &cookie.id) {
            Ok(Some(session)) if !session.is_expired_at(Utc::now()) => SessionOutcome::Valid(session),
            Ok(_) => SessionOutcome::Absent,
            Err(e) => SessionOutcome::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::cookie::DEFAULT_COOKIE_NAME;
    use crate::identity::{Principal, SessionManager};
    use crate::storage::{DatabasePool, DocumentStore, MemoryStore};
    use axum::http::header::COOKIE;
    use axum::http::HeaderValue;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn with_cookie(id: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        let v = format!("{}={}", DEFAULT_COOKIE_NAME, SessionCookie::new(id).encode());
        h.insert(COOKIE, HeaderValue::from_str(&v).unwrap());
        h
    }

    #[test]
    fn three_way_classification() {
        let store = Arc::new(MemoryStore::new());
        let pool = DatabasePool::new(store.clone());
        let lease = pool.acquire();
        let db = lease.database();
        let resolver = SessionResolver::new(DEFAULT_COOKIE_NAME);

        assert!(matches!(resolver.resolve(&HeaderMap::new(), &db), SessionOutcome::Absent));

        let mut junk = HeaderMap::new();
        junk.insert(COOKIE, HeaderValue::from_static("pritunl-zero=%%%"));
        assert!(matches!(resolver.resolve(&junk, &db), SessionOutcome::Absent));

        assert!(matches!(resolver.resolve(&with_cookie("unknown"), &db), SessionOutcome::Absent));

        let s = SessionManager::new(Duration::from_secs(60))
            .issue(&db, Principal { user_id: "bob".into(), ..Default::default() })
            .unwrap();
        match resolver.resolve(&with_cookie(&s.id), &db) {
            SessionOutcome::Valid(got) => assert_eq!(got.principal.user_id, "bob"),
            other => panic!("expected valid session, got {other:?}"),
        }

        store.upsert(SESSIONS_COLLECTION, "broken", json!({"id": "broken"})).unwrap();
        assert!(matches!(resolver.resolve(&with_cookie("broken"), &db), SessionOutcome::Failed(_)));
    }

    #[test]
    fn expired_session_is_absent() {
        let store = Arc::new(MemoryStore::new());
        let pool = DatabasePool::new(store.clone());
        let lease = pool.acquire();
        let db = lease.database();
        let mut s = SessionManager::default()
            .issue(&db, Principal { user_id: "eve".into(), ..Default::default() })
            .unwrap();
        s.expires_at = Utc::now() - chrono::Duration::seconds(1);
        db.upsert_as(SESSIONS_COLLECTION, &s.id, &s).unwrap();
        let resolver = SessionResolver::new(DEFAULT_COOKIE_NAME);
        assert!(matches!(resolver.resolve(&with_cookie(&s.id), &db), SessionOutcome::Absent));
    }
}
