use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(test)]
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{Auth, AuthSession, AuthUser, Backend, BackendError, Query};

const MEMORY_STORAGE_BASE: &str = "memory://storage";

struct StoredUser {
    user: AuthUser,
    password: String,
}

/// In-process platform stand-in. Rows are JSON objects per table; unique
/// keys mirror the constraints declared in `schema/`.
pub struct MemoryBackend {
    tables: DashMap<String, Vec<Value>>,
    unique_keys: DashMap<String, Vec<String>>,
    users: DashMap<String, StoredUser>,
    sessions: DashMap<String, Uuid>,
    objects: DashMap<String, (Vec<u8>, String)>,
    offline: AtomicBool,
    #[cfg(test)]
    reads: Mutex<Vec<String>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let backend = Self {
            tables: DashMap::new(),
            unique_keys: DashMap::new(),
            users: DashMap::new(),
            sessions: DashMap::new(),
            objects: DashMap::new(),
            offline: AtomicBool::new(false),
            #[cfg(test)]
            reads: Mutex::new(Vec::new()),
        };
        backend.declare_unique("favorites", &["user_id", "experience_id"]);
        backend.declare_unique("experience_categories", &["experience_id", "category_id"]);
        backend.declare_unique("profiles", &["id"]);
        backend.declare_unique("businesses", &["user_id"]);
        backend
    }

    pub fn declare_unique(&self, table: &str, columns: &[&str]) {
        self.unique_keys.insert(
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
    }

    /// Inserts fixture rows as-is, bypassing unique checks.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .get(table)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    /// Makes every subsequent call fail as if the platform were unreachable.
    #[cfg(test)]
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Tables read by `select`/`count`, in call order.
    #[cfg(test)]
    pub fn read_log(&self) -> Vec<String> {
        self.reads.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Registers an account and returns a live session for it.
    pub fn register_user(&self, email: &str, password: &str) -> AuthSession {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
        };
        self.users.insert(
            email.to_lowercase(),
            StoredUser {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        self.open_session(user)
    }

    #[cfg(test)]
    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.get(path).map(|entry| entry.0.clone())
    }

    fn open_session(&self, user: AuthUser) -> AuthSession {
        let token = format!("mem-{}", Uuid::new_v4().simple());
        self.sessions.insert(token.clone(), user.id);
        AuthSession {
            access_token: token,
            user,
        }
    }

    fn ensure_online(&self) -> Result<(), BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(BackendError::Unavailable)
        } else {
            Ok(())
        }
    }

    #[cfg(test)]
    fn log_read(&self, table: &str) {
        if let Ok(mut log) = self.reads.lock() {
            log.push(table.to_string());
        }
    }

    #[cfg(not(test))]
    fn log_read(&self, _table: &str) {}

    fn unique_columns(&self, table: &str) -> Option<Vec<String>> {
        self.unique_keys.get(table).map(|cols| cols.clone())
    }

    fn prepare_row(row: Value) -> Value {
        let mut row = match row {
            Value::Object(map) => map,
            other => return other,
        };
        row.entry("id").or_insert_with(|| json!(Uuid::new_v4()));
        row.entry("created_at").or_insert_with(|| json!(Utc::now()));
        Value::Object(row)
    }
}

fn same_key(a: &Value, b: &Value, columns: &[String]) -> bool {
    columns.iter().all(|c| a.get(c) == b.get(c))
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Value::Object(target), Value::Object(patch)) = (target, patch) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn select(&self, _auth: &Auth, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.ensure_online()?;
        self.log_read(&query.table);
        let matched: Vec<Value> = self
            .rows(&query.table)
            .into_iter()
            .filter(|row| query.matches(row))
            .collect();
        Ok(query.shape(matched))
    }

    async fn count(&self, _auth: &Auth, query: &Query) -> Result<u64, BackendError> {
        self.ensure_online()?;
        self.log_read(&query.table);
        let total = self
            .tables
            .get(&query.table)
            .map(|rows| rows.iter().filter(|row| query.matches(row)).count())
            .unwrap_or(0);
        Ok(total as u64)
    }

    async fn insert(
        &self,
        _auth: &Auth,
        table: &str,
        rows: Vec<Value>,
    ) -> Result<Vec<Value>, BackendError> {
        self.ensure_online()?;
        let unique = self.unique_columns(table);
        let mut stored = self.tables.entry(table.to_string()).or_default();

        let prepared: Vec<Value> = rows.into_iter().map(Self::prepare_row).collect();
        if let Some(columns) = &unique {
            for row in &prepared {
                if stored.iter().any(|existing| same_key(existing, row, columns)) {
                    return Err(BackendError::Conflict(format!(
                        "duplicate key on {table} ({})",
                        columns.join(", ")
                    )));
                }
            }
        }

        stored.extend(prepared.iter().cloned());
        Ok(prepared)
    }

    async fn append(&self, auth: &Auth, table: &str, rows: Vec<Value>) -> Result<(), BackendError> {
        self.insert(auth, table, rows).await.map(|_| ())
    }

    async fn update(
        &self,
        _auth: &Auth,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        self.ensure_online()?;
        let mut updated = Vec::new();
        if let Some(mut rows) = self.tables.get_mut(&query.table) {
            for row in rows.iter_mut().filter(|row| query.matches(row)) {
                merge(row, &patch);
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, _auth: &Auth, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.ensure_online()?;
        let mut removed = Vec::new();
        if let Some(mut rows) = self.tables.get_mut(&query.table) {
            let (gone, kept): (Vec<Value>, Vec<Value>) =
                rows.drain(..).partition(|row| query.matches(row));
            *rows = kept;
            removed = gone;
        }
        Ok(removed)
    }

    async fn upsert(
        &self,
        _auth: &Auth,
        table: &str,
        rows: Vec<Value>,
        on_conflict: &[&str],
    ) -> Result<Vec<Value>, BackendError> {
        self.ensure_online()?;
        let columns: Vec<String> = on_conflict.iter().map(|c| c.to_string()).collect();
        let mut stored = self.tables.entry(table.to_string()).or_default();
        let mut written = Vec::with_capacity(rows.len());

        for row in rows {
            match stored.iter_mut().find(|existing| same_key(existing, &row, &columns)) {
                Some(existing) => {
                    merge(existing, &row);
                    written.push(existing.clone());
                }
                None => {
                    let row = Self::prepare_row(row);
                    stored.push(row.clone());
                    written.push(row);
                }
            }
        }
        Ok(written)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _metadata: Value,
    ) -> Result<Option<AuthSession>, BackendError> {
        self.ensure_online()?;
        if self.users.contains_key(&email.to_lowercase()) {
            return Err(BackendError::Conflict("user already registered".to_string()));
        }
        Ok(Some(self.register_user(email, password)))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError> {
        self.ensure_online()?;
        let user = match self.users.get(&email.to_lowercase()) {
            Some(stored) if stored.password == password => stored.user.clone(),
            _ => return Err(BackendError::InvalidCredentials),
        };
        Ok(self.open_session(user))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        self.ensure_online()?;
        self.sessions.remove(access_token);
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<Option<AuthUser>, BackendError> {
        self.ensure_online()?;
        let Some(user_id) = self.sessions.get(access_token).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self
            .users
            .iter()
            .find(|entry| entry.user.id == user_id)
            .map(|entry| entry.user.clone()))
    }

    async fn upload(
        &self,
        _auth: &Auth,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        self.ensure_online()?;
        self.objects
            .insert(format!("{bucket}/{path}"), (bytes, content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{MEMORY_STORAGE_BASE}/{bucket}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Filter;

    #[tokio::test]
    async fn insert_enforces_declared_unique_keys() {
        let backend = MemoryBackend::new();
        let row = json!({ "user_id": "u1", "experience_id": "e1" });
        backend.insert(&Auth::Anonymous, "favorites", vec![row.clone()]).await.unwrap();

        let err = backend
            .insert(&Auth::Anonymous, "favorites", vec![row])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Conflict(_)));
        assert_eq!(backend.rows("favorites").len(), 1);
    }

    #[tokio::test]
    async fn append_stores_rows_without_reading() {
        let backend = MemoryBackend::new();
        backend
            .append(&Auth::Anonymous, "experience_events", vec![json!({ "event_type": "view" })])
            .await
            .unwrap();

        let rows = backend.rows("experience_events");
        assert_eq!(rows.len(), 1);
        assert!(rows[0].get("id").is_some());
        assert!(backend.read_log().is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_touch_only_matching_rows() {
        let backend = MemoryBackend::new();
        backend.seed(
            "experiences",
            vec![
                json!({ "id": "a", "status": "pending" }),
                json!({ "id": "b", "status": "pending" }),
            ],
        );

        let updated = backend
            .update(
                &Auth::Anonymous,
                &Query::table("experiences").eq("id", "a"),
                json!({ "status": "approved" }),
            )
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);

        let approved = backend
            .count(
                &Auth::Anonymous,
                &Query::table("experiences").filter(Filter::eq("status", "approved")),
            )
            .await
            .unwrap();
        assert_eq!(approved, 1);

        let removed = backend
            .delete(&Auth::Anonymous, &Query::table("experiences").eq("id", "b"))
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(backend.rows("experiences").len(), 1);
    }

    #[tokio::test]
    async fn upsert_merges_on_conflict_columns() {
        let backend = MemoryBackend::new();
        let id = Uuid::new_v4();
        backend
            .upsert(&Auth::Anonymous, "profiles", vec![json!({ "id": id, "role": "user" })], &["id"])
            .await
            .unwrap();
        backend
            .upsert(&Auth::Anonymous, "profiles", vec![json!({ "id": id, "role": "business" })], &["id"])
            .await
            .unwrap();

        let rows = backend.rows("profiles");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["role"], "business");
    }

    #[tokio::test]
    async fn sessions_resolve_to_users_until_signed_out() {
        let backend = MemoryBackend::new();
        let session = backend.register_user("guide@example.ie", "hunter22");

        let user = backend.current_user(&session.access_token).await.unwrap();
        assert_eq!(user.map(|u| u.id), Some(session.user.id));

        assert!(matches!(
            backend.sign_in("guide@example.ie", "wrong").await,
            Err(BackendError::InvalidCredentials)
        ));

        backend.sign_out(&session.access_token).await.unwrap();
        assert!(backend.current_user(&session.access_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn offline_mode_fails_every_call() {
        let backend = MemoryBackend::new();
        backend.set_offline(true);
        assert!(matches!(
            backend.select(&Auth::Anonymous, &Query::table("experiences")).await,
            Err(BackendError::Unavailable)
        ));
    }
}
