//! View and booking-click tracking for the business dashboard.
//!
//! De-duplication lives in the visitor's browser, so it is best-effort: a
//! visitor who clears cookies is counted again.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;

use crate::backend::{Auth, BackendError};
use crate::database::Database;
use crate::local_store::LocalStore;
use crate::models::{DailyMetric, MetricEvent, MetricKind, MetricsSeries};

pub const COOLDOWN_MINUTES: i64 = 30;
pub const VISITOR_KEY: &str = "ef_visitor_id";
pub const DEFAULT_SERIES_DAYS: u32 = 14;

/// Returns the browser's visitor id, minting one on first use.
pub fn visitor_id(store: &mut dyn LocalStore) -> String {
    if let Some(id) = store.get(VISITOR_KEY).filter(|id| !id.is_empty()) {
        return id;
    }
    let id = Uuid::new_v4().to_string();
    store.set(VISITOR_KEY, id.clone());
    id
}

pub fn dedup_key(experience_id: Uuid, kind: MetricKind) -> String {
    format!("exp_metric_{}_{}", kind, experience_id.simple())
}

/// Stamps the window and returns true when no event of this kind was
/// recorded for the experience within the cool-down.
pub fn should_record(
    store: &mut dyn LocalStore,
    experience_id: Uuid,
    kind: MetricKind,
    now: DateTime<Utc>,
) -> bool {
    let key = dedup_key(experience_id, kind);
    let last = store
        .get(&key)
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    if let Some(last) = last {
        if now.signed_duration_since(last) < Duration::minutes(COOLDOWN_MINUTES) {
            return false;
        }
    }
    store.set(&key, now.timestamp().to_string());
    true
}

#[derive(Debug, Clone)]
pub struct MetricHit {
    pub experience_id: Uuid,
    pub business_id: Option<Uuid>,
    pub kind: MetricKind,
    pub source: Option<String>,
}

/// Records the hit unless it falls inside the cool-down. Never fails; the
/// return value says whether a row was written.
pub async fn record(
    db: &Database,
    auth: &Auth,
    store: &mut dyn LocalStore,
    user_id: Option<Uuid>,
    hit: MetricHit,
    now: DateTime<Utc>,
) -> bool {
    if !should_record(store, hit.experience_id, hit.kind, now) {
        log::debug!(
            "Skipping duplicate {} for experience {}",
            hit.kind,
            hit.experience_id
        );
        return false;
    }

    let event = MetricEvent {
        experience_id: hit.experience_id,
        business_id: hit.business_id,
        session_id: visitor_id(store),
        user_id,
        event_type: hit.kind,
        source: hit.source,
        created_at: now,
    };

    match db.insert_metric_event(auth, event).await {
        Ok(()) => true,
        Err(err) => {
            log::warn!(
                "Failed to record {} for experience {}: {err}",
                hit.kind,
                hit.experience_id
            );
            false
        }
    }
}

/// Buckets events into one entry per day, oldest first, ending at `today`.
pub fn daily_counts(events: &[MetricEvent], days: u32, today: NaiveDate) -> Vec<DailyMetric> {
    let days = days.max(1);
    let start = today - Duration::days(i64::from(days) - 1);
    let mut buckets: Vec<DailyMetric> = (0..days)
        .map(|offset| DailyMetric {
            day: start + Duration::days(i64::from(offset)),
            views: 0,
            booking_clicks: 0,
        })
        .collect();

    for event in events {
        let day = event.created_at.date_naive();
        if day < start || day > today {
            continue;
        }
        let index = (day - start).num_days() as usize;
        match event.event_type {
            MetricKind::View => buckets[index].views += 1,
            MetricKind::BookingClick => buckets[index].booking_clicks += 1,
        }
    }
    buckets
}

pub fn daily_series(events: &[MetricEvent], days: u32, today: NaiveDate) -> MetricsSeries {
    let counts = daily_counts(events, days, today);
    MetricsSeries {
        labels: counts.iter().map(|d| d.day.format("%d %b").to_string()).collect(),
        views: counts.iter().map(|d| d.views).collect(),
        booking_clicks: counts.iter().map(|d| d.booking_clicks).collect(),
        total_views: counts.iter().map(|d| d.views).sum(),
        total_booking_clicks: counts.iter().map(|d| d.booking_clicks).sum(),
    }
}

pub async fn load_business_series(
    db: &Database,
    auth: &Auth,
    business_id: Uuid,
    days: u32,
    now: DateTime<Utc>,
) -> Result<MetricsSeries, BackendError> {
    let today = now.date_naive();
    let start = today - Duration::days(i64::from(days.max(1)) - 1);
    let since = start.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    let events = db.metric_events_for_business(auth, business_id, since).await?;
    Ok(daily_series(&events, days, today))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::local_store::MemoryStore;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, hour, minute, 0).unwrap()
    }

    fn view(experience_id: Uuid) -> MetricHit {
        MetricHit {
            experience_id,
            business_id: Some(Uuid::new_v4()),
            kind: MetricKind::View,
            source: None,
        }
    }

    #[tokio::test]
    async fn repeat_view_inside_window_records_once() {
        let backend = Arc::new(MemoryBackend::new());
        let db = Database::new(backend.clone());
        let mut store = MemoryStore::new();
        let id = Uuid::new_v4();

        assert!(record(&db, &Auth::Anonymous, &mut store, None, view(id), at(10, 0)).await);
        assert!(!record(&db, &Auth::Anonymous, &mut store, None, view(id), at(10, 10)).await);
        assert_eq!(backend.rows("experience_events").len(), 1);
    }

    #[tokio::test]
    async fn views_outside_window_record_twice_with_same_visitor() {
        let backend = Arc::new(MemoryBackend::new());
        let db = Database::new(backend.clone());
        let mut store = MemoryStore::new();
        let id = Uuid::new_v4();

        assert!(record(&db, &Auth::Anonymous, &mut store, None, view(id), at(10, 0)).await);
        assert!(record(&db, &Auth::Anonymous, &mut store, None, view(id), at(10, 31)).await);

        let rows = backend.rows("experience_events");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["session_id"], rows[1]["session_id"]);
    }

    #[test]
    fn kinds_have_separate_windows() {
        let mut store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(should_record(&mut store, id, MetricKind::View, at(9, 0)));
        assert!(should_record(&mut store, id, MetricKind::BookingClick, at(9, 1)));
        assert!(!should_record(&mut store, id, MetricKind::View, at(9, 2)));
        assert!(should_record(&mut store, Uuid::new_v4(), MetricKind::View, at(9, 2)));
    }

    #[tokio::test]
    async fn failed_insert_is_swallowed() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_offline(true);
        let db = Database::new(backend.clone());
        let mut store = MemoryStore::new();
        assert!(!record(&db, &Auth::Anonymous, &mut store, None, view(Uuid::new_v4()), at(8, 0)).await);
    }

    #[test]
    fn daily_series_fills_gaps_and_drops_old_events() {
        let experience_id = Uuid::new_v4();
        let event = |created_at, kind| MetricEvent {
            experience_id,
            business_id: None,
            session_id: "s".into(),
            user_id: None,
            event_type: kind,
            source: None,
            created_at,
        };
        let events = vec![
            event(at(10, 0), MetricKind::View),
            event(at(11, 0), MetricKind::View),
            event(at(12, 0), MetricKind::BookingClick),
            event(at(12, 0) - Duration::days(2), MetricKind::View),
            event(at(12, 0) - Duration::days(30), MetricKind::View),
        ];
        let series = daily_series(&events, 7, at(0, 0).date_naive());
        assert_eq!(series.labels.len(), 7);
        assert_eq!(series.labels[6], "14 Mar");
        assert_eq!(series.views, vec![0, 0, 0, 0, 1, 0, 2]);
        assert_eq!(series.booking_clicks[6], 1);
        assert_eq!(series.total_views, 3);
        assert_eq!(series.total_booking_clicks, 1);
    }
}
