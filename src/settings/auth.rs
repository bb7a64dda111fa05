use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Key of the authentication settings document.
pub const AUTH_KEY: &str = "auth";
/// Default endpoint of the external authentication broker.
pub const DEFAULT_AUTH_SERVER: &str = "https://auth.pritunl.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Azure,
    Google,
    Saml,
}

/// How a principal's roles are maintained after the first external login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleManagement {
    /// Default roles are granted once at creation; later changes are local.
    #[default]
    SetOnInsert,
    /// Roles are replaced from the provider on every login.
    Overwrite,
}

/// Type-specific provider configuration. Stored flat next to the common fields,
/// discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderKind {
    Azure {
        #[serde(default)]
        tenant: String,
        #[serde(default)]
        client_id: String,
        #[serde(default)]
        client_secret: String,
    },
    Google {
        #[serde(default)]
        domain: String,
    },
    Saml {
        #[serde(default)]
        issuer_url: String,
        #[serde(default)]
        saml_url: String,
        #[serde(default)]
        saml_cert: String,
    },
}

impl ProviderKind {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderKind::Azure { .. } => ProviderType::Azure,
            ProviderKind::Google { .. } => ProviderType::Google,
            ProviderKind::Saml { .. } => ProviderType::Saml,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub default_roles: Vec<String>,
    #[serde(default)]
    pub auto_create: bool,
    #[serde(default)]
    pub role_management: RoleManagement,
    #[serde(flatten)]
    pub kind: ProviderKind,
}

impl Provider {
    pub fn provider_type(&self) -> ProviderType { self.kind.provider_type() }
}

/// Authentication settings singleton. Fields missing from a stored record take
/// their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub id: String,
    pub server: String,
    /// Session expiry, hours.
    pub expire: u64,
    /// Provider re-sync interval, seconds.
    pub sync: u64,
    /// Absolute session lifetime, hours. Zero disables the cap.
    pub max_duration: u64,
    pub providers: Vec<Provider>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            id: AUTH_KEY.to_string(),
            server: DEFAULT_AUTH_SERVER.to_string(),
            expire: 72,
            sync: 1800,
            max_duration: 24,
            providers: Vec::new(),
        }
    }
}

impl AuthSettings {
    /// First provider with the given id.
    pub fn provider(&self, id: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn expire_duration(&self) -> Duration { Duration::from_secs(self.expire * 3600) }

    pub fn sync_interval(&self) -> Duration { Duration::from_secs(self.sync) }

    pub fn max_duration(&self) -> Option<Duration> {
        if self.max_duration == 0 { None } else { Some(Duration::from_secs(self.max_duration * 3600)) }
    }

    /// Lifetime of a newly issued session: the expiry, capped by the max duration.
    pub fn session_ttl(&self) -> Duration {
        match self.max_duration() {
            Some(max) => self.expire_duration().min(max),
            None => self.expire_duration(),
        }
    }

    /// Provider ids that occur more than once, in first-seen order.
    pub fn duplicate_provider_ids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut dups: Vec<String> = Vec::new();
        for p in &self.providers {
            if !seen.insert(p.id.as_str()) && !dups.contains(&p.id) {
                dups.push(p.id.clone());
            }
        }
        dups
    }
}
