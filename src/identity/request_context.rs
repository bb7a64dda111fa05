use super::{Principal, Session};

/// Who the request is, as settled by the session stage.
#[derive(Debug, Clone)]
pub enum Access {
    Authenticated(Session),
    Anonymous,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub access: Access,
    pub request_id: String,
    pub client: String,
}

impl RequestContext {
    pub fn session(&self) -> Option<&Session> {
        match &self.access {
            Access::Authenticated(s) => Some(s),
            Access::Anonymous => None,
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.session().map(|s| &s.principal)
    }

    pub fn is_authenticated(&self) -> bool { self.session().is_some() }
}
