use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use tracing::warn;

use crate::identity::{User, USERS_COLLECTION};
use crate::storage::{find_as, upsert_as, DocumentStore};

/// Account created on first start so the gateway can be administered at all.
pub const DEFAULT_ADMIN: &str = "pritunl";
pub const ADMIN_ROLE: &str = "administrator";

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

/// Create the default administrator if it does not exist. Returns true if created.
pub fn ensure_default_admin(store: &dyn DocumentStore) -> Result<bool> {
    if find_as::<User>(store, USERS_COLLECTION, DEFAULT_ADMIN)?.is_some() {
        return Ok(false);
    }
    let user = User {
        id: DEFAULT_ADMIN.to_string(),
        password_hash: hash_password(DEFAULT_ADMIN)?,
        roles: vec![ADMIN_ROLE.to_string()],
        disabled: false,
    };
    upsert_as(store, USERS_COLLECTION, DEFAULT_ADMIN, &user)?;
    warn!(target: "startup", user = DEFAULT_ADMIN, "Created default administrator with default password; change it");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn hash_then_verify() {
        let phc = hash_password("hunter2").unwrap();
        assert!(phc.starts_with("$argon2"));
        assert!(verify_password(&phc, "hunter2"));
        assert!(!verify_password(&phc, "hunter3"));
        assert!(!verify_password("not-a-phc", "hunter2"));
    }

    #[test]
    fn default_admin_created_once() {
        let store = MemoryStore::new();
        assert!(ensure_default_admin(&store).unwrap());
        assert!(!ensure_default_admin(&store).unwrap());
        let admin: User = find_as(&store, USERS_COLLECTION, DEFAULT_ADMIN).unwrap().unwrap();
        assert!(verify_password(&admin.password_hash, DEFAULT_ADMIN));
        assert_eq!(admin.roles, vec![ADMIN_ROLE.to_string()]);
    }
}
