use std::collections::HashMap;

use uuid::Uuid;

use crate::backend::{Auth, BackendError};
use crate::database::Database;
use crate::models::ExperienceListing;

/// Flips the saved state and returns the state read back afterwards, not the
/// state we assumed we wrote.
pub async fn toggle(
    db: &Database,
    auth: &Auth,
    user_id: Uuid,
    experience_id: Uuid,
) -> Result<bool, BackendError> {
    if db.favorite_exists(auth, user_id, experience_id).await? {
        db.remove_favorite(auth, user_id, experience_id).await?;
    } else {
        match db.add_favorite(auth, user_id, experience_id).await {
            Ok(()) => {}
            // Another tab saved it first.
            Err(BackendError::Conflict(_)) => {
                log::debug!("Favorite {user_id}/{experience_id} already present");
            }
            Err(err) => return Err(err),
        }
    }
    db.favorite_exists(auth, user_id, experience_id).await
}

/// Saved experiences that are still publicly visible, most recently saved
/// first.
pub async fn list(
    db: &Database,
    auth: &Auth,
    user_id: Uuid,
) -> Result<Vec<ExperienceListing>, BackendError> {
    let ids = db.favorite_experience_ids(auth, user_id).await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let rank: HashMap<Uuid, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut experiences: Vec<_> = db
        .experiences_by_ids(auth, &ids)
        .await?
        .into_iter()
        .filter(|e| e.is_publicly_visible())
        .collect();
    experiences.sort_by_key(|e| rank.get(&e.id).copied().unwrap_or(usize::MAX));

    db.enrich(auth, experiences).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::backend::MemoryBackend;

    fn setup() -> (Arc<MemoryBackend>, Database) {
        let backend = Arc::new(MemoryBackend::new());
        let db = Database::new(backend.clone());
        (backend, db)
    }

    fn seed_experience(backend: &MemoryBackend, title: &str, status: &str, published: bool) -> Uuid {
        let id = Uuid::new_v4();
        backend.seed(
            "experiences",
            vec![json!({
                "id": id,
                "title": title,
                "status": status,
                "is_published": published,
                "county": "Galway",
            })],
        );
        id
    }

    #[tokio::test]
    async fn toggling_twice_leaves_no_rows() {
        let (backend, db) = setup();
        let user = Uuid::new_v4();
        let experience = seed_experience(&backend, "Cliff walk", "approved", true);

        assert!(toggle(&db, &Auth::Anonymous, user, experience).await.unwrap());
        assert_eq!(backend.rows("favorites").len(), 1);
        assert!(!toggle(&db, &Auth::Anonymous, user, experience).await.unwrap());
        assert!(backend.rows("favorites").is_empty());
    }

    #[tokio::test]
    async fn saving_never_duplicates() {
        let (backend, db) = setup();
        let user = Uuid::new_v4();
        let experience = seed_experience(&backend, "Cliff walk", "approved", true);

        db.add_favorite(&Auth::Anonymous, user, experience).await.unwrap();
        assert!(matches!(
            db.add_favorite(&Auth::Anonymous, user, experience).await,
            Err(BackendError::Conflict(_))
        ));
        assert_eq!(backend.rows("favorites").len(), 1);
    }

    #[tokio::test]
    async fn list_hides_withdrawn_experiences() {
        let (backend, db) = setup();
        let user = Uuid::new_v4();
        let visible = seed_experience(&backend, "Surf lesson", "Approved", true);
        let withdrawn = seed_experience(&backend, "Old tour", "pending", true);
        let unpublished = seed_experience(&backend, "Hidden", "approved", false);
        for id in [visible, withdrawn, unpublished] {
            toggle(&db, &Auth::Anonymous, user, id).await.unwrap();
        }

        let listings = list(&db, &Auth::Anonymous, user).await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].experience.id, visible);
    }

    #[tokio::test]
    async fn toggle_reports_platform_failure() {
        let (backend, db) = setup();
        backend.set_offline(true);
        assert!(toggle(&db, &Auth::Anonymous, Uuid::new_v4(), Uuid::new_v4())
            .await
            .is_err());
    }
}
