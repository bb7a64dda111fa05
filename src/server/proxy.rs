//! Upstream relay for authenticated requests.
//!
//! The gateway's session cookie is removed from the Cookie header before a request
//! leaves the gateway, so backends never see the gateway's own credential.

use std::fmt::Display;
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{CONNECTION, COOKIE, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use tracing::error;

use super::AppState;
use crate::error::{status_message, AppError};
use crate::identity::RequestContext;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// What sanitizing did to a Cookie header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stripped {
    /// The cookie was not present; the header must be left exactly as it was.
    Unchanged,
    Replaced(String),
    /// Nothing but the session cookie was present; drop the header.
    Removed,
}

/// Splice `<name>=...` out of a Cookie header value.
///
/// The pair ends at the next `;`. Exactly one space after that `;` is consumed too,
/// and only a literal space; other spacing is left as sent.
pub fn strip_cookie_value(cookie: &str, name: &str) -> Stripped {
    let needle = format!("{}=", name);
    let Some(start) = cookie.find(&needle) else { return Stripped::Unchanged };
    let rest = &cookie[start..];
    let spliced = match rest.find(';') {
        Some(mut end) => {
            if rest.as_bytes().get(end + 1) == Some(&b' ') {
                end += 1;
            }
            format!("{}{}", &cookie[..start], &cookie[start + end + 1..])
        }
        None => cookie[..start].to_string(),
    };
    let trimmed = spliced.trim();
    if trimmed.is_empty() { Stripped::Removed } else { Stripped::Replaced(trimmed.to_string()) }
}

/// Remove the session cookie from the request's cookies.
///
/// Every Cookie header is folded into a single `; `-joined value before splicing, and
/// headers that are not valid UTF-8 are dropped. A lone header without the cookie is
/// left exactly as sent.
pub fn strip_cookie(headers: &mut HeaderMap, name: &str) {
    let mut seen = 0;
    let mut readable: Vec<String> = Vec::new();
    for value in headers.get_all(COOKIE) {
        seen += 1;
        if let Ok(s) = value.to_str() {
            readable.push(s.to_string());
        }
    }
    if seen == 0 {
        return;
    }

    let mut cookie = readable.join("; ");
    let mut changed = false;
    // a request may carry the cookie more than once
    loop {
        match strip_cookie_value(&cookie, name) {
            Stripped::Unchanged => break,
            Stripped::Replaced(v) => {
                cookie = v;
                changed = true;
            }
            Stripped::Removed => {
                cookie.clear();
                changed = true;
                break;
            }
        }
    }
    if !changed && seen == 1 && readable.len() == 1 {
        return;
    }

    headers.remove(COOKIE);
    if cookie.trim().is_empty() {
        return;
    }
    if let Ok(v) = HeaderValue::from_str(&cookie) {
        headers.insert(COOKIE, v);
    }
}

/// Drop hop-by-hop headers, including any the Connection header names.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Log a relay failure with the client address and answer with a generic message.
pub fn write_error(client: &str, status: StatusCode, err: &dyn Display) -> Response {
    error!(target: "proxy", client, error = %err, "proxy: Serve error");
    (status, status_message(status)).into_response()
}

/// Upstream URL for `uri`: the upstream base path joined with the request path and query.
pub fn upstream_url(base: &reqwest::Url, uri: &Uri) -> reqwest::Url {
    let mut url = base.clone();
    let path = format!("{}{}", base.path().trim_end_matches('/'), uri.path());
    url.set_path(&path);
    url.set_query(uri.query());
    url
}

pub async fn relay(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    req: Request,
) -> Response {
    let Some(base) = state.upstream.as_ref() else {
        return AppError::not_found("no_upstream", "no upstream configured").into_response();
    };
    let (parts, body) = req.into_parts();
    let body = match axum::body::to_bytes(body, state.body_limit).await {
        Ok(b) => b,
        Err(e) => return write_error(&ctx.client, StatusCode::PAYLOAD_TOO_LARGE, &e),
    };

    let mut headers = parts.headers;
    strip_cookie(&mut headers, state.resolver.cookie_name());
    strip_hop_by_hop(&mut headers);
    headers.remove(HOST);
    let forwarded = ctx.client.parse::<SocketAddr>().map(|a| a.ip().to_string()).unwrap_or_else(|_| ctx.client.clone());
    if let Ok(v) = HeaderValue::from_str(&forwarded) {
        headers.insert(HeaderName::from_static("x-forwarded-for"), v);
    }

    let url = upstream_url(base, &parts.uri);
    let upstream_resp = match state.http.request(parts.method, url).headers(headers).body(body).send().await {
        Ok(r) => r,
        Err(e) => return write_error(&ctx.client, StatusCode::BAD_GATEWAY, &e),
    };

    let status = upstream_resp.status();
    let mut resp_headers = upstream_resp.headers().clone();
    strip_hop_by_hop(&mut resp_headers);
    let bytes = match upstream_resp.bytes().await {
        Ok(b) => b,
        Err(e) => return write_error(&ctx.client, StatusCode::BAD_GATEWAY, &e),
    };

    let mut out = Response::new(Body::from(bytes));
    *out.status_mut() = status;
    *out.headers_mut() = resp_headers;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: &str = "pritunl-zero";

    #[test]
    fn middle_pair_removed() {
        assert_eq!(strip_cookie_value("a=1; pritunl-zero=TOKEN; b=2", NAME), Stripped::Replaced("a=1; b=2".into()));
    }

    #[test]
    fn only_pair_removes_header() {
        assert_eq!(strip_cookie_value("pritunl-zero=TOKEN", NAME), Stripped::Removed);
        assert_eq!(strip_cookie_value("pritunl-zero=TOKEN; ", NAME), Stripped::Removed);
    }

    #[test]
    fn last_pair_removed() {
        assert_eq!(strip_cookie_value("a=1; pritunl-zero=TOKEN", NAME), Stripped::Replaced("a=1".into()));
    }

    #[test]
    fn first_pair_removed() {
        assert_eq!(strip_cookie_value("pritunl-zero=TOKEN; a=1; b=2", NAME), Stripped::Replaced("a=1; b=2".into()));
    }

    #[test]
    fn no_match_is_untouched() {
        assert_eq!(strip_cookie_value("a=1;  b=2 ", NAME), Stripped::Unchanged);
        assert_eq!(strip_cookie_value("pritunl-zero-other", NAME), Stripped::Unchanged);
    }

    #[test]
    fn only_one_literal_space_is_consumed() {
        assert_eq!(strip_cookie_value("a=1;pritunl-zero=T;b=2", NAME), Stripped::Replaced("a=1;b=2".into()));
        assert_eq!(strip_cookie_value("a=1; pritunl-zero=T;  b=2", NAME), Stripped::Replaced("a=1;  b=2".into()));
        assert_eq!(strip_cookie_value("a=1; pritunl-zero=T;\tb=2", NAME), Stripped::Replaced("a=1; \tb=2".into()));
    }

    #[test]
    fn header_map_handling() {
        let mut h = HeaderMap::new();
        h.insert(COOKIE, HeaderValue::from_static("a=1; pritunl-zero=TOKEN; b=2"));
        strip_cookie(&mut h, NAME);
        assert_eq!(h.get(COOKIE).unwrap(), "a=1; b=2");

        let mut h = HeaderMap::new();
        h.insert(COOKIE, HeaderValue::from_static("pritunl-zero=TOKEN"));
        strip_cookie(&mut h, NAME);
        assert!(h.get(COOKIE).is_none());

        let mut h = HeaderMap::new();
        h.insert(COOKIE, HeaderValue::from_static(" x=1;y=2 "));
        strip_cookie(&mut h, NAME);
        assert_eq!(h.get(COOKIE).unwrap().as_bytes(), b" x=1;y=2 ");

        let mut h = HeaderMap::new();
        strip_cookie(&mut h, NAME);
        assert!(h.is_empty());
    }

    #[test]
    fn every_cookie_header_is_sanitized() {
        let mut h = HeaderMap::new();
        h.append(COOKIE, HeaderValue::from_static("a=1"));
        h.append(COOKIE, HeaderValue::from_static("pritunl-zero=TOKEN; b=2"));
        strip_cookie(&mut h, NAME);
        let all: Vec<_> = h.get_all(COOKIE).iter().collect();
        assert_eq!(all, vec!["a=1; b=2"]);

        let mut h = HeaderMap::new();
        h.append(COOKIE, HeaderValue::from_static("pritunl-zero=ONE"));
        h.append(COOKIE, HeaderValue::from_static("pritunl-zero=TWO"));
        strip_cookie(&mut h, NAME);
        assert!(h.get(COOKIE).is_none());

        // several headers without the cookie are folded but otherwise kept
        let mut h = HeaderMap::new();
        h.append(COOKIE, HeaderValue::from_static("a=1"));
        h.append(COOKIE, HeaderValue::from_static("b=2"));
        strip_cookie(&mut h, NAME);
        assert_eq!(h.get_all(COOKIE).iter().count(), 1);
        assert_eq!(h.get(COOKIE).unwrap(), "a=1; b=2");
    }

    #[test]
    fn repeated_cookie_in_one_header_is_fully_removed() {
        let mut h = HeaderMap::new();
        h.insert(COOKIE, HeaderValue::from_static("pritunl-zero=A; x=1; pritunl-zero=B"));
        strip_cookie(&mut h, NAME);
        assert_eq!(h.get(COOKIE).unwrap(), "x=1");
    }

    #[test]
    fn unreadable_cookie_header_is_never_forwarded() {
        let mut h = HeaderMap::new();
        h.append(COOKIE, HeaderValue::from_bytes(b"pritunl-zero=T\xff").unwrap());
        strip_cookie(&mut h, NAME);
        assert!(h.get(COOKIE).is_none());

        let mut h = HeaderMap::new();
        h.append(COOKIE, HeaderValue::from_static("a=1"));
        h.append(COOKIE, HeaderValue::from_bytes(b"pritunl-zero=T\xff").unwrap());
        strip_cookie(&mut h, NAME);
        assert_eq!(h.get_all(COOKIE).iter().count(), 1);
        assert_eq!(h.get(COOKIE).unwrap(), "a=1");
    }

    #[test]
    fn connection_listed_headers_are_dropped() {
        let mut h = HeaderMap::new();
        h.insert(CONNECTION, HeaderValue::from_static("close, X-Session-Hint , keep-alive"));
        h.insert("x-session-hint", HeaderValue::from_static("secret"));
        h.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        h.insert("te", HeaderValue::from_static("trailers"));
        h.insert("x-kept", HeaderValue::from_static("yes"));
        strip_hop_by_hop(&mut h);
        assert!(h.get("x-session-hint").is_none());
        assert!(h.get(CONNECTION).is_none());
        assert!(h.get("keep-alive").is_none());
        assert!(h.get("te").is_none());
        assert_eq!(h.get("x-kept").unwrap(), "yes");
    }

    #[test]
    fn upstream_paths_join() {
        let base = reqwest::Url::parse("http://backend:8080/app/").unwrap();
        let uri: Uri = "/reports/1?x=2".parse().unwrap();
        assert_eq!(upstream_url(&base, &uri).as_str(), "http://backend:8080/app/reports/1?x=2");
        let base = reqwest::Url::parse("http://backend").unwrap();
        let uri: Uri = "/a".parse().unwrap();
        assert_eq!(upstream_url(&base, &uri).as_str(), "http://backend/a");
    }
}
