use serde::{Deserialize, Serialize};
use tracing::info;

use super::principal::{Attrs, Principal};
use super::session::{Session, SessionManager};
use crate::error::{AppError, AppResult};
use crate::security;
use crate::storage::Database;

pub const USERS_COLLECTION: &str = "users";

/// Local account record, stored under its user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(skip)]
    pub ip: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub session: Session,
}

fn invalid_credentials() -> AppError {
    AppError::auth("invalid_credentials", "invalid username or password")
}

/// Verify a local account and issue a session for it.
///
/// Unknown users, disabled users and wrong passwords all fail the same way.
pub fn login_local(db: &Database, sm: &SessionManager, req: &LoginRequest) -> AppResult<LoginResponse> {
    let Some(user) = db.find_as::<User>(USERS_COLLECTION, &req.username)? else {
        return Err(invalid_credentials());
    };
    if user.disabled || !security::verify_password(&user.password_hash, &req.password) {
        return Err(invalid_credentials());
    }
    let principal = Principal {
        user_id: user.id.clone(),
        roles: user.roles.clone(),
        attrs: Attrs { provider: None, ip: req.ip.clone() },
    };
    let session = sm.issue(db, principal)?;
    info!(user = %req.username, "auth.login");
    Ok(LoginResponse { session })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DatabasePool, MemoryStore};
    use std::sync::Arc;

    fn seeded() -> (DatabasePool, Database) {
        let pool = DatabasePool::new(Arc::new(MemoryStore::new()));
        let db = pool.acquire().database();
        let user = User {
            id: "alice".into(),
            password_hash: security::hash_password("s3cret").unwrap(),
            roles: vec!["administrator".into()],
            disabled: false,
        };
        db.upsert_as(USERS_COLLECTION, "alice", &user).unwrap();
        (pool, db)
    }

    fn req(user: &str, pass: &str) -> LoginRequest {
        LoginRequest { username: user.into(), password: pass.into(), ip: Some("10.0.0.1".into()) }
    }

    #[test]
    fn correct_password_issues_session() {
        let (_pool, db) = seeded();
        let resp = login_local(&db, &SessionManager::default(), &req("alice", "s3cret")).unwrap();
        assert_eq!(resp.session.principal.user_id, "alice");
        assert_eq!(resp.session.principal.roles, vec!["administrator".to_string()]);
        assert_eq!(resp.session.principal.attrs.ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn failures_look_alike() {
        let (_pool, db) = seeded();
        let sm = SessionManager::default();
        let wrong = login_local(&db, &sm, &req("alice", "nope")).unwrap_err();
        let unknown = login_local(&db, &sm, &req("mallory", "s3cret")).unwrap_err();
        assert_eq!(wrong.code_str(), "invalid_credentials");
        assert_eq!(unknown.code_str(), "invalid_credentials");
        assert_eq!(wrong.http_status(), 401);
    }
}
