use uuid::Uuid;

use crate::backend::{Auth, BackendError, Filter};
use crate::database::Database;
use crate::filters::{compose, public_visibility, FilterSelection};
use crate::models::{ExperienceListing, ExperienceStatus};

pub const DEFAULT_RESULT_LIMIT: usize = 60;

/// Which rows a surface may show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Approved and published only.
    Public,
    /// Everything, optionally narrowed to one status (admin).
    Privileged(Option<ExperienceStatus>),
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub visibility: Visibility,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            visibility: Visibility::Public,
            limit: DEFAULT_RESULT_LIMIT,
        }
    }
}

/// What a results container shows after a search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Results(Vec<ExperienceListing>),
    Empty,
    Unavailable,
}

/// Runs the composed filter. Category membership is resolved first; when no
/// experience is linked to the category the experiences table is never
/// queried.
pub async fn find_experiences(
    db: &Database,
    auth: &Auth,
    selection: &FilterSelection,
    options: SearchOptions,
) -> Result<Vec<ExperienceListing>, BackendError> {
    let composed = compose(selection);
    let mut query = Database::experiences_query();

    if let Some(category_id) = composed.category_id {
        let linked: Vec<Uuid> = db.linked_experience_ids(auth, category_id).await?;
        if linked.is_empty() {
            log::debug!("Category {category_id} has no linked experiences");
            return Ok(Vec::new());
        }
        query = query.filter(Filter::is_in("id", linked.iter().map(|id| id.to_string())));
    }

    query = query.filters(composed.constraints);
    match options.visibility {
        Visibility::Public => query = query.filters(public_visibility()),
        Visibility::Privileged(Some(status)) => {
            query = query.filter(Filter::ilike("status", status.as_str()))
        }
        Visibility::Privileged(None) => {}
    }
    query = query.order_by("created_at", false).limit(options.limit);

    let mut experiences = db.query_experiences(auth, query).await?;
    if options.visibility == Visibility::Public {
        experiences.retain(|e| e.is_publicly_visible());
    }
    db.enrich(auth, experiences).await
}

/// `find_experiences` with failures folded into the generic unavailable
/// state.
pub async fn search(
    db: &Database,
    auth: &Auth,
    selection: &FilterSelection,
    options: SearchOptions,
) -> SearchOutcome {
    match find_experiences(db, auth, selection, options).await {
        Ok(listings) if listings.is_empty() => SearchOutcome::Empty,
        Ok(listings) => SearchOutcome::Results(listings),
        Err(err) => {
            log::error!("Failed to load experiences: {err:?}");
            SearchOutcome::Unavailable
        }
    }
}
