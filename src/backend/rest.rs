use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

use super::{Auth, AuthSession, AuthUser, Backend, BackendError, Query};

#[derive(Debug, Serialize)]
struct CredentialsPayload<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUpPayload<'a> {
    email: &'a str,
    password: &'a str,
    data: Value,
}

/// HTTPS client for the hosted platform's data, auth and storage APIs.
#[derive(Clone)]
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl RestBackend {
    pub fn new(base_url: &str, anon_key: String, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            anon_key,
        })
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder, auth: &Auth) -> RequestBuilder {
        let bearer = auth.token().unwrap_or(&self.anon_key);
        builder.header("apikey", &self.anon_key).bearer_auth(bearer)
    }

    fn insert_request(&self, auth: &Auth, table: &str, rows: &[Value], prefer: &str) -> RequestBuilder {
        let builder = self
            .client
            .post(self.rest_url(table))
            .header("Prefer", prefer)
            .json(rows);
        self.authorize(builder, auth)
    }

    async fn send_rows(&self, builder: RequestBuilder) -> Result<Vec<Value>, BackendError> {
        let response = ensure_success(builder.send().await?).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&body)? {
            Value::Array(rows) => Ok(rows),
            single => Ok(vec![single]),
        }
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn select(&self, auth: &Auth, query: &Query) -> Result<Vec<Value>, BackendError> {
        let builder = self
            .client
            .get(self.rest_url(&query.table))
            .query(&query.to_params());
        self.send_rows(self.authorize(builder, auth)).await
    }

    async fn count(&self, auth: &Auth, query: &Query) -> Result<u64, BackendError> {
        let mut params = query.filter_params();
        params.push(("select".to_string(), "*".to_string()));
        let builder = self
            .client
            .head(self.rest_url(&query.table))
            .query(&params)
            .header("Prefer", "count=exact");
        let response = ensure_success(self.authorize(builder, auth).send().await?).await?;

        response
            .headers()
            .get("content-range")
            .and_then(|h| h.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| BackendError::Status {
                status: response.status().as_u16(),
                message: "missing Content-Range total".to_string(),
            })
    }

    async fn insert(
        &self,
        auth: &Auth,
        table: &str,
        rows: Vec<Value>,
    ) -> Result<Vec<Value>, BackendError> {
        let builder = self.insert_request(auth, table, &rows, "return=representation");
        self.send_rows(builder).await
    }

    async fn append(&self, auth: &Auth, table: &str, rows: Vec<Value>) -> Result<(), BackendError> {
        let builder = self.insert_request(auth, table, &rows, "return=minimal");
        ensure_success(builder.send().await?).await?;
        Ok(())
    }

    async fn update(
        &self,
        auth: &Auth,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        let builder = self
            .client
            .patch(self.rest_url(&query.table))
            .query(&query.filter_params())
            .header("Prefer", "return=representation")
            .json(&patch);
        self.send_rows(self.authorize(builder, auth)).await
    }

    async fn delete(&self, auth: &Auth, query: &Query) -> Result<Vec<Value>, BackendError> {
        let builder = self
            .client
            .delete(self.rest_url(&query.table))
            .query(&query.filter_params())
            .header("Prefer", "return=representation");
        self.send_rows(self.authorize(builder, auth)).await
    }

    async fn upsert(
        &self,
        auth: &Auth,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
    ) -> Result<Vec<Value>, BackendError> {
        let builder = self
            .client
            .post(self.rest_url(table))
            .query(&[("on_conflict", on_conflict.join(","))])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&rows);
        self.send_rows(self.authorize(builder, auth)).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<Option<AuthSession>, BackendError> {
        let builder = self.client.post(self.auth_url("signup")).json(&SignUpPayload {
            email,
            password,
            data: metadata,
        });
        let response = ensure_success(self.authorize(builder, &Auth::Anonymous).send().await?).await?;
        let body: Value = response.json().await?;
        parse_session(&body)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        let builder = self
            .client
            .post(self.auth_url("token"))
            .query(&[("grant_type", "password")])
            .json(&CredentialsPayload { email, password });
        let response = self.authorize(builder, &Auth::Anonymous).send().await?;

        if matches!(response.status(), StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED) {
            return Err(BackendError::InvalidCredentials);
        }

        let response = ensure_success(response).await?;
        let body: Value = response.json().await?;
        parse_session(&body)?.ok_or(BackendError::InvalidCredentials)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let builder = self.client.post(self.auth_url("logout"));
        let auth = Auth::Bearer(access_token.to_string());
        ensure_success(self.authorize(builder, &auth).send().await?).await?;
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<Option<AuthUser>, BackendError> {
        let builder = self.client.get(self.auth_url("user"));
        let auth = Auth::Bearer(access_token.to_string());
        let response = self.authorize(builder, &auth).send().await?;

        if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Ok(None);
        }

        let response = ensure_success(response).await?;
        Ok(Some(response.json::<AuthUser>().await?))
    }

    async fn upload(
        &self,
        auth: &Auth,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path);
        let builder = self
            .client
            .post(url)
            .header("content-type", content_type)
            .header("x-upsert", "true")
            .body(bytes);
        ensure_success(self.authorize(builder, auth).send().await?).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, path)
    }
}

async fn ensure_success(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED => BackendError::Unauthorized,
        StatusCode::CONFLICT => BackendError::Conflict(message),
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            BackendError::Unavailable
        }
        _ => BackendError::Status {
            status: status.as_u16(),
            message,
        },
    })
}

/// Sign-in responses carry the session at the top level; sign-up responses
/// without a session only describe the user.
fn parse_session(body: &Value) -> Result<Option<AuthSession>, BackendError> {
    let Some(token) = body.get("access_token").and_then(Value::as_str) else {
        return Ok(None);
    };
    let user: AuthUser = match body.get("user") {
        Some(user) => serde_json::from_value(user.clone())?,
        None => return Ok(None),
    };
    Ok(Some(AuthSession {
        access_token: token.to_string(),
        user,
    }))
}

fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse().ok()
}

fn normalize_base_url(value: &str) -> String {
    let trimmed = value.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/rest/v1")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_base_urls() {
        assert_eq!(normalize_base_url("https://x.example.co/"), "https://x.example.co");
        assert_eq!(normalize_base_url("https://x.example.co/rest/v1/"), "https://x.example.co");
        assert_eq!(normalize_base_url(" https://x.example.co "), "https://x.example.co");
    }

    #[test]
    fn reads_total_from_content_range() {
        assert_eq!(parse_content_range_total("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-24/*"), None);
    }

    #[test]
    fn parses_session_payloads() {
        let id = uuid::Uuid::new_v4();
        let body = json!({
            "access_token": "tok",
            "token_type": "bearer",
            "user": { "id": id, "email": "a@b.ie" }
        });
        let session = parse_session(&body).unwrap().unwrap();
        assert_eq!(session.access_token, "tok");
        assert_eq!(session.user.id, id);

        let pending_confirmation = json!({ "id": id, "email": "a@b.ie" });
        assert!(parse_session(&pending_confirmation).unwrap().is_none());
    }

    #[test]
    fn append_does_not_ask_for_rows_back() {
        let backend = RestBackend::new("https://x.example.co", "anon".into(), Duration::from_secs(1)).unwrap();
        let rows = vec![json!({ "event_type": "view" })];

        let append = backend
            .insert_request(&Auth::Anonymous, "experience_events", &rows, "return=minimal")
            .build()
            .unwrap();
        assert_eq!(append.url().as_str(), "https://x.example.co/rest/v1/experience_events");
        assert_eq!(append.headers().get("Prefer").unwrap(), "return=minimal");
        assert_eq!(append.headers().get("apikey").unwrap(), "anon");
    }

    #[test]
    fn builds_public_storage_urls() {
        let backend = RestBackend::new("https://x.example.co", "anon".into(), Duration::from_secs(1)).unwrap();
        assert_eq!(
            backend.public_url("experience-images", "b/e/1.jpg"),
            "https://x.example.co/storage/v1/object/public/experience-images/b/e/1.jpg"
        );
    }
}
