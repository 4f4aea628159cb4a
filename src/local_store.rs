//! Per-browser key/value state. On a server-rendered site the browser's
//! cookie jar plays the role of local storage; tests use the in-memory store.

use std::collections::HashMap;

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{HttpRequest, HttpResponse};

pub trait LocalStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }
}

/// Reads the request's cookies and collects writes so they can be attached
/// to whatever response the handler ends up sending.
#[derive(Debug)]
pub struct CookieStore {
    values: HashMap<String, String>,
    pending: Vec<Cookie<'static>>,
    secure: bool,
}

/// One year. Visitor ids are meant to outlive browser sessions.
const COOKIE_MAX_AGE_DAYS: i64 = 365;

impl CookieStore {
    pub fn from_request(req: &HttpRequest, secure: bool) -> Self {
        let values = req
            .cookies()
            .map(|jar| {
                jar.iter()
                    .map(|c| (c.name().to_string(), c.value().to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            values,
            pending: Vec::new(),
            secure,
        }
    }

    pub fn apply(self, response: &mut HttpResponse) {
        for cookie in self.pending {
            if let Err(err) = response.add_cookie(&cookie) {
                log::warn!("Failed to attach cookie {}: {err}", cookie.name());
            }
        }
    }
}

impl LocalStore for CookieStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value.clone());
        let cookie = Cookie::build(key.to_string(), value)
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(CookieDuration::days(COOKIE_MAX_AGE_DAYS))
            .finish();
        self.pending.retain(|c| c.name() != key);
        self.pending.push(cookie);
    }
}

#[cfg(test)]
mod tests {
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn cookie_store_reads_request_and_queues_writes() {
        let req = TestRequest::default()
            .cookie(Cookie::new("ef_visitor_id", "abc"))
            .to_http_request();
        let mut store = CookieStore::from_request(&req, false);
        assert_eq!(store.get("ef_visitor_id").as_deref(), Some("abc"));

        store.set("exp_metric_view_1", "10".into());
        store.set("exp_metric_view_1", "20".into());
        assert_eq!(store.get("exp_metric_view_1").as_deref(), Some("20"));

        let mut response = HttpResponse::Ok().finish();
        store.apply(&mut response);
        let cookies: Vec<_> = response.cookies().collect();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value(), "20");
        assert_eq!(cookies[0].path(), Some("/"));
    }

    #[test]
    fn memory_store_is_plain_map() {
        let mut store = MemoryStore::new();
        assert!(store.get("k").is_none());
        store.set("k", "v".into());
        assert_eq!(store.get("k").as_deref(), Some("v"));
    }
}
