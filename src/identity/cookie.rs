use axum::http::header::{InvalidHeaderValue, COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Name of the gateway's own session cookie unless configured otherwise.
pub const DEFAULT_COOKIE_NAME: &str = "pritunl-zero";

/// Structured payload carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub id: String,
}

impl SessionCookie {
    pub fn new(id: impl Into<String>) -> Self { Self { id: id.into() } }

    /// base64url(JSON), safe to place in a cookie value unquoted.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    /// Anything that does not decode to a non-empty id is treated as no cookie.
    pub fn decode(raw: &str) -> Option<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(raw.trim()).ok()?;
        let cookie: SessionCookie = serde_json::from_slice(&bytes).ok()?;
        if cookie.id.is_empty() { None } else { Some(cookie) }
    }

    pub fn from_headers(headers: &HeaderMap, name: &str) -> Option<Self> {
        parse_cookie(headers, name).and_then(|raw| Self::decode(&raw))
    }
}

/// Value of the first cookie called `name` across all Cookie headers.
pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for value in headers.get_all(COOKIE) {
        let Ok(s) = value.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some(eq) = p.find('=') {
                let (k, v) = p.split_at(eq);
                if k == name { return Some(v[1..].to_string()); }
            }
        }
    }
    None
}

/// Secure, HttpOnly cookie scoped to path / with SameSite=Strict
pub fn set_session_cookie(name: &str, cookie: &SessionCookie) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!("{}={}; HttpOnly; Secure; SameSite=Strict; Path=/", name, cookie.encode()))
}

pub fn clear_session_cookie(name: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!("{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cookie: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        h
    }

    #[test]
    fn encode_decode() {
        let c = SessionCookie::new("abc");
        let raw = c.encode();
        assert!(!raw.contains(';') && !raw.contains('='));
        assert_eq!(SessionCookie::decode(&raw), Some(c));
    }

    #[test]
    fn garbage_is_no_cookie() {
        assert_eq!(SessionCookie::decode("not base64!"), None);
        // valid base64 of non-json
        assert_eq!(SessionCookie::decode("aGVsbG8"), None);
        let empty = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(br#"{"id":""}"#);
        assert_eq!(SessionCookie::decode(&empty), None);
    }

    #[test]
    fn picks_named_cookie() {
        let c = SessionCookie::new("s1");
        let h = headers(&format!("theme=dark; pritunl-zero={}; lang=en", c.encode()));
        assert_eq!(SessionCookie::from_headers(&h, DEFAULT_COOKIE_NAME), Some(c));
        assert_eq!(parse_cookie(&h, "lang").as_deref(), Some("en"));
        assert!(parse_cookie(&h, "zero").is_none());
        assert!(SessionCookie::from_headers(&HeaderMap::new(), DEFAULT_COOKIE_NAME).is_none());
    }

    #[test]
    fn set_and_clear_values() {
        let v = set_session_cookie("gw", &SessionCookie::new("x")).unwrap();
        let s = v.to_str().unwrap();
        assert!(s.starts_with("gw="));
        assert!(s.contains("HttpOnly"));
        let cleared = clear_session_cookie("gw").unwrap();
        assert!(cleared.to_str().unwrap().contains("1970"));
    }
}
