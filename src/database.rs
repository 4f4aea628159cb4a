use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use futures_util::try_join;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::backend::{Auth, Backend, BackendError, Filter, Query};
use crate::models::{
    Business, Experience, ExperienceCategory, ExperienceImage, ExperienceListing,
    ExperienceStatus, Favorite, MetricEvent, NewExperience, Profile, Role, StatusCounts,
};

const EXPERIENCES: &str = "experiences";
const EXPERIENCE_CATEGORIES: &str = "experience_categories";
const EXPERIENCE_IMAGES: &str = "experience_images";
const BUSINESSES: &str = "businesses";
const PROFILES: &str = "profiles";
const FAVORITES: &str = "favorites";
const EVENTS: &str = "experience_events";

/// Typed access to the platform's tables. Every call carries the caller's
/// credentials so the platform can apply row-level security.
#[derive(Clone)]
pub struct Database {
    backend: Arc<dyn Backend>,
}

fn decode<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, BackendError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(BackendError::from))
        .collect()
}

fn decode_one<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Option<T>, BackendError> {
    Ok(decode(rows)?.into_iter().next())
}

fn ids_filter(column: &str, ids: &[Uuid]) -> Filter {
    Filter::is_in(column, ids.iter().map(|id| id.to_string()))
}

fn dedupe_uuids(ids: impl IntoIterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

impl Database {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    // ========================================================================
    // EXPERIENCES
    // ========================================================================

    pub async fn query_experiences(
        &self,
        auth: &Auth,
        query: Query,
    ) -> Result<Vec<Experience>, BackendError> {
        debug_assert_eq!(query.table, EXPERIENCES);
        decode(self.backend.select(auth, &query).await?)
    }

    pub fn experiences_query() -> Query {
        Query::table(EXPERIENCES)
    }

    pub async fn get_experience(
        &self,
        auth: &Auth,
        experience_id: Uuid,
    ) -> Result<Option<Experience>, BackendError> {
        let query = Query::table(EXPERIENCES)
            .eq("id", experience_id.to_string())
            .limit(1);
        decode_one(self.backend.select(auth, &query).await?)
    }

    pub async fn experiences_by_ids(
        &self,
        auth: &Auth,
        ids: &[Uuid],
    ) -> Result<Vec<Experience>, BackendError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::table(EXPERIENCES)
            .filter(ids_filter("id", ids))
            .order_by("created_at", false);
        decode(self.backend.select(auth, &query).await?)
    }

    pub async fn list_experiences_for_business(
        &self,
        auth: &Auth,
        business_id: Uuid,
    ) -> Result<Vec<Experience>, BackendError> {
        let query = Query::table(EXPERIENCES)
            .eq("business_id", business_id.to_string())
            .order_by("created_at", false);
        decode(self.backend.select(auth, &query).await?)
    }

    pub async fn create_experience(
        &self,
        auth: &Auth,
        experience: NewExperience,
    ) -> Result<Experience, BackendError> {
        let rows = self
            .backend
            .insert(auth, EXPERIENCES, vec![serde_json::to_value(experience)?])
            .await?;
        decode_one(rows)?.ok_or_else(|| BackendError::Status {
            status: 500,
            message: "insert returned no row".to_string(),
        })
    }

    pub async fn update_experience(
        &self,
        auth: &Auth,
        experience_id: Uuid,
        patch: Value,
    ) -> Result<Option<Experience>, BackendError> {
        let query = Query::table(EXPERIENCES).eq("id", experience_id.to_string());
        decode_one(self.backend.update(auth, &query, patch).await?)
    }

    pub async fn set_experience_status(
        &self,
        auth: &Auth,
        experience_id: Uuid,
        status: ExperienceStatus,
    ) -> Result<Option<Experience>, BackendError> {
        self.update_experience(auth, experience_id, json!({ "status": status }))
            .await
    }

    /// Removes the experience and its dependent rows. Returns `false` when
    /// nothing matched.
    pub async fn delete_experience(
        &self,
        auth: &Auth,
        experience_id: Uuid,
    ) -> Result<bool, BackendError> {
        let id = experience_id.to_string();
        let links = Query::table(EXPERIENCE_CATEGORIES).eq("experience_id", id.clone());
        let images = Query::table(EXPERIENCE_IMAGES).eq("experience_id", id.clone());
        let favorites = Query::table(FAVORITES).eq("experience_id", id.clone());
        try_join!(
            self.backend.delete(auth, &links),
            self.backend.delete(auth, &images),
            self.backend.delete(auth, &favorites),
        )?;

        let removed = self
            .backend
            .delete(auth, &Query::table(EXPERIENCES).eq("id", id))
            .await?;
        Ok(!removed.is_empty())
    }

    pub async fn count_experiences(
        &self,
        auth: &Auth,
        status: ExperienceStatus,
    ) -> Result<u64, BackendError> {
        let query = Query::table(EXPERIENCES).filter(Filter::ilike("status", status.as_str()));
        self.backend.count(auth, &query).await
    }

    pub async fn status_counts(&self, auth: &Auth) -> Result<StatusCounts, BackendError> {
        let (draft, pending, approved, rejected) = try_join!(
            self.count_experiences(auth, ExperienceStatus::Draft),
            self.count_experiences(auth, ExperienceStatus::Pending),
            self.count_experiences(auth, ExperienceStatus::Approved),
            self.count_experiences(auth, ExperienceStatus::Rejected),
        )?;
        let mut counts = StatusCounts::default();
        counts.set(ExperienceStatus::Draft, draft);
        counts.set(ExperienceStatus::Pending, pending);
        counts.set(ExperienceStatus::Approved, approved);
        counts.set(ExperienceStatus::Rejected, rejected);
        Ok(counts)
    }

    // ========================================================================
    // CATEGORIES
    // ========================================================================

    /// Experience ids linked to a category through the link table.
    pub async fn linked_experience_ids(
        &self,
        auth: &Auth,
        category_id: i64,
    ) -> Result<Vec<Uuid>, BackendError> {
        let query = Query::table(EXPERIENCE_CATEGORIES)
            .select("experience_id,category_id")
            .eq("category_id", category_id);
        let links: Vec<ExperienceCategory> = decode(self.backend.select(auth, &query).await?)?;
        Ok(dedupe_uuids(links.into_iter().map(|l| l.experience_id)))
    }

    pub async fn categories_for_experiences(
        &self,
        auth: &Auth,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<i64>>, BackendError> {
        let mut by_experience: HashMap<Uuid, Vec<i64>> = HashMap::new();
        if ids.is_empty() {
            return Ok(by_experience);
        }
        let query = Query::table(EXPERIENCE_CATEGORIES)
            .select("experience_id,category_id")
            .filter(ids_filter("experience_id", ids));
        let links: Vec<ExperienceCategory> = decode(self.backend.select(auth, &query).await?)?;
        for link in links {
            by_experience
                .entry(link.experience_id)
                .or_default()
                .push(link.category_id);
        }
        for categories in by_experience.values_mut() {
            categories.sort_unstable();
        }
        Ok(by_experience)
    }

    /// Replaces the experience's category links.
    pub async fn set_experience_categories(
        &self,
        auth: &Auth,
        experience_id: Uuid,
        category_ids: &[i64],
    ) -> Result<(), BackendError> {
        let existing = Query::table(EXPERIENCE_CATEGORIES).eq("experience_id", experience_id.to_string());
        self.backend.delete(auth, &existing).await?;

        if category_ids.is_empty() {
            return Ok(());
        }
        let rows = category_ids
            .iter()
            .map(|category_id| {
                serde_json::to_value(ExperienceCategory {
                    experience_id,
                    category_id: *category_id,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.backend.insert(auth, EXPERIENCE_CATEGORIES, rows).await?;
        Ok(())
    }

    // ========================================================================
    // IMAGES
    // ========================================================================

    pub async fn images_for_experiences(
        &self,
        auth: &Auth,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<ExperienceImage>>, BackendError> {
        let mut by_experience: HashMap<Uuid, Vec<ExperienceImage>> = HashMap::new();
        if ids.is_empty() {
            return Ok(by_experience);
        }
        let query = Query::table(EXPERIENCE_IMAGES)
            .filter(ids_filter("experience_id", ids))
            .order_by("display_order", true);
        let images: Vec<ExperienceImage> = decode(self.backend.select(auth, &query).await?)?;
        for image in images {
            by_experience.entry(image.experience_id).or_default().push(image);
        }
        Ok(by_experience)
    }

    pub async fn add_image(
        &self,
        auth: &Auth,
        image: ExperienceImage,
    ) -> Result<ExperienceImage, BackendError> {
        let rows = self
            .backend
            .insert(auth, EXPERIENCE_IMAGES, vec![serde_json::to_value(image)?])
            .await?;
        decode_one(rows)?.ok_or_else(|| BackendError::Status {
            status: 500,
            message: "insert returned no row".to_string(),
        })
    }

    /// Flags one image as primary and clears the flag on its siblings.
    pub async fn set_primary_image(
        &self,
        auth: &Auth,
        experience_id: Uuid,
        image_id: Uuid,
    ) -> Result<bool, BackendError> {
        let siblings = Query::table(EXPERIENCE_IMAGES).eq("experience_id", experience_id.to_string());
        self.backend
            .update(auth, &siblings, json!({ "is_primary": false }))
            .await?;

        let target = siblings.eq("id", image_id.to_string());
        let updated = self
            .backend
            .update(auth, &target, json!({ "is_primary": true }))
            .await?;
        Ok(!updated.is_empty())
    }

    // ========================================================================
    // BUSINESSES & PROFILES
    // ========================================================================

    pub async fn businesses_by_ids(
        &self,
        auth: &Auth,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Business>, BackendError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let query = Query::table(BUSINESSES).filter(ids_filter("id", ids));
        let businesses: Vec<Business> = decode(self.backend.select(auth, &query).await?)?;
        Ok(businesses.into_iter().map(|b| (b.id, b)).collect())
    }

    pub async fn business_for_user(
        &self,
        auth: &Auth,
        user_id: Uuid,
    ) -> Result<Option<Business>, BackendError> {
        let query = Query::table(BUSINESSES)
            .eq("user_id", user_id.to_string())
            .limit(1);
        decode_one(self.backend.select(auth, &query).await?)
    }

    pub async fn upsert_business(
        &self,
        auth: &Auth,
        row: Value,
    ) -> Result<Business, BackendError> {
        let rows = self
            .backend
            .upsert(auth, BUSINESSES, vec![row], &["user_id"])
            .await?;
        decode_one(rows)?.ok_or_else(|| BackendError::Status {
            status: 500,
            message: "upsert returned no row".to_string(),
        })
    }

    pub async fn role_for_user(
        &self,
        auth: &Auth,
        user_id: Uuid,
    ) -> Result<Option<Role>, BackendError> {
        let query = Query::table(PROFILES)
            .select("id,role")
            .eq("id", user_id.to_string())
            .limit(1);
        let profile: Option<Profile> = decode_one(self.backend.select(auth, &query).await?)?;
        Ok(profile.map(|p| p.role))
    }

    pub async fn upsert_profile(&self, auth: &Auth, profile: Profile) -> Result<(), BackendError> {
        self.backend
            .upsert(auth, PROFILES, vec![serde_json::to_value(profile)?], &["id"])
            .await?;
        Ok(())
    }

    // ========================================================================
    // FAVORITES
    // ========================================================================

    fn favorite_query(user_id: Uuid, experience_id: Uuid) -> Query {
        Query::table(FAVORITES)
            .eq("user_id", user_id.to_string())
            .eq("experience_id", experience_id.to_string())
    }

    pub async fn favorite_exists(
        &self,
        auth: &Auth,
        user_id: Uuid,
        experience_id: Uuid,
    ) -> Result<bool, BackendError> {
        let count = self
            .backend
            .count(auth, &Self::favorite_query(user_id, experience_id))
            .await?;
        Ok(count > 0)
    }

    pub async fn add_favorite(
        &self,
        auth: &Auth,
        user_id: Uuid,
        experience_id: Uuid,
    ) -> Result<(), BackendError> {
        let row = serde_json::to_value(Favorite {
            user_id,
            experience_id,
        })?;
        self.backend.insert(auth, FAVORITES, vec![row]).await?;
        Ok(())
    }

    pub async fn remove_favorite(
        &self,
        auth: &Auth,
        user_id: Uuid,
        experience_id: Uuid,
    ) -> Result<(), BackendError> {
        self.backend
            .delete(auth, &Self::favorite_query(user_id, experience_id))
            .await?;
        Ok(())
    }

    pub async fn favorite_experience_ids(
        &self,
        auth: &Auth,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, BackendError> {
        let query = Query::table(FAVORITES)
            .select("user_id,experience_id")
            .eq("user_id", user_id.to_string())
            .order_by("created_at", false);
        let favorites: Vec<Favorite> = decode(self.backend.select(auth, &query).await?)?;
        Ok(dedupe_uuids(favorites.into_iter().map(|f| f.experience_id)))
    }

    // ========================================================================
    // METRICS
    // ========================================================================

    pub async fn insert_metric_event(
        &self,
        auth: &Auth,
        event: MetricEvent,
    ) -> Result<(), BackendError> {
        self.backend
            .append(auth, EVENTS, vec![serde_json::to_value(event)?])
            .await
    }

    pub async fn metric_events_for_business(
        &self,
        auth: &Auth,
        business_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<MetricEvent>, BackendError> {
        let query = Query::table(EVENTS)
            .eq("business_id", business_id.to_string())
            .filter(Filter::gte("created_at", since.to_rfc3339()))
            .order_by("created_at", true);
        decode(self.backend.select(auth, &query).await?)
    }

    // ========================================================================
    // LISTINGS
    // ========================================================================

    /// Attaches images, owning business and category ids to each experience,
    /// preserving input order.
    pub async fn enrich(
        &self,
        auth: &Auth,
        experiences: Vec<Experience>,
    ) -> Result<Vec<ExperienceListing>, BackendError> {
        if experiences.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = experiences.iter().map(|e| e.id).collect();
        let business_ids = dedupe_uuids(experiences.iter().filter_map(|e| e.business_id));

        let (mut images, businesses, mut categories) = try_join!(
            self.images_for_experiences(auth, &ids),
            self.businesses_by_ids(auth, &business_ids),
            self.categories_for_experiences(auth, &ids),
        )?;

        Ok(experiences
            .into_iter()
            .map(|experience| ExperienceListing {
                business: experience
                    .business_id
                    .and_then(|id| businesses.get(&id).cloned()),
                images: images.remove(&experience.id).unwrap_or_default(),
                category_ids: categories.remove(&experience.id).unwrap_or_default(),
                experience,
            })
            .collect())
    }

    pub async fn get_listing(
        &self,
        auth: &Auth,
        experience_id: Uuid,
    ) -> Result<Option<ExperienceListing>, BackendError> {
        match self.get_experience(auth, experience_id).await? {
            Some(experience) => Ok(self.enrich(auth, vec![experience]).await?.into_iter().next()),
            None => Ok(None),
        }
    }
}
