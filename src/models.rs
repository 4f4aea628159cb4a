use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

// ============================================================================
// ENUMS
// ============================================================================

/// Experience moderation status. Stored as lowercase text, but rows written
/// by older dashboards may use other casings.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl ExperienceStatus {
    pub const ALL: [ExperienceStatus; 4] = [
        ExperienceStatus::Draft,
        ExperienceStatus::Pending,
        ExperienceStatus::Approved,
        ExperienceStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceStatus::Draft => "draft",
            ExperienceStatus::Pending => "pending",
            ExperienceStatus::Approved => "approved",
            ExperienceStatus::Rejected => "rejected",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExperienceStatus::Draft => "Draft",
            ExperienceStatus::Pending => "Pending review",
            ExperienceStatus::Approved => "Approved",
            ExperienceStatus::Rejected => "Rejected",
        }
    }
}

impl FromStr for ExperienceStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(ExperienceStatus::Draft),
            "pending" => Ok(ExperienceStatus::Pending),
            "approved" => Ok(ExperienceStatus::Approved),
            "rejected" => Ok(ExperienceStatus::Rejected),
            other => Err(format!("unknown experience status '{other}'")),
        }
    }
}

impl<'de> Deserialize<'de> for ExperienceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Account role stored on the `profiles` row.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Business,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Business => "business",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" | "consumer" => Ok(Role::User),
            "business" => Ok(Role::Business),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Kind of analytics event recorded against an experience.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    View,
    BookingClick,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::View => "view",
            MetricKind::BookingClick => "booking_click",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// EXPERIENCES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experience {
    pub id: Uuid,
    #[serde(default)]
    pub business_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub long_description: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub price_min: Option<f64>,
    #[serde(default)]
    pub price_max: Option<f64>,
    pub status: ExperienceStatus,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub booking_url: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Experience {
    /// Anonymous and consumer surfaces only ever show approved, published rows.
    pub fn is_publicly_visible(&self) -> bool {
        self.status == ExperienceStatus::Approved && self.is_published
    }
}

/// Insert payload for a new experience.
#[derive(Debug, Clone, Serialize)]
pub struct NewExperience {
    pub id: Uuid,
    pub business_id: Uuid,
    pub title: String,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub county: String,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub status: ExperienceStatus,
    pub is_published: bool,
    pub booking_url: Option<String>,
    pub duration: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperienceImage {
    pub id: Uuid,
    pub experience_id: Uuid,
    pub url: String,
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub display_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperienceCategory {
    pub experience_id: Uuid,
    pub category_id: i64,
}

// ============================================================================
// BUSINESSES & PROFILES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Business {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    pub role: Role,
}

// ============================================================================
// FAVORITES & METRICS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Favorite {
    pub user_id: Uuid,
    pub experience_id: Uuid,
}

/// Append-only analytics row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricEvent {
    pub experience_id: Uuid,
    #[serde(default)]
    pub business_id: Option<Uuid>,
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub event_type: MetricKind,
    #[serde(default)]
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Daily counts used by the dashboard chart.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DailyMetric {
    pub day: NaiveDate,
    pub views: u64,
    pub booking_clicks: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSeries {
    pub labels: Vec<String>,
    pub views: Vec<u64>,
    pub booking_clicks: Vec<u64>,
    pub total_views: u64,
    pub total_booking_clicks: u64,
}

// ============================================================================
// COMPOSITE RESPONSE TYPES
// ============================================================================

/// Experience with the rows every card needs.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExperienceListing {
    pub experience: Experience,
    pub business: Option<Business>,
    pub images: Vec<ExperienceImage>,
    pub category_ids: Vec<i64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub draft: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

impl StatusCounts {
    pub fn set(&mut self, status: ExperienceStatus, count: u64) {
        match status {
            ExperienceStatus::Draft => self.draft = count,
            ExperienceStatus::Pending => self.pending = count,
            ExperienceStatus::Approved => self.approved = count,
            ExperienceStatus::Rejected => self.rejected = count,
        }
    }
}

/// API response wrapper for the JSON endpoints.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// FORMS
// ============================================================================

/// Browsers submit empty inputs as `""`; treat those as absent.
fn blank_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

fn optional_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    match blank_as_none(deserializer)? {
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("'{raw}' is not a number"))),
        None => Ok(None),
    }
}

/// True for absolute `http`/`https` URLs, the only links rendered as `href`.
pub fn is_web_url(raw: &str) -> bool {
    reqwest::Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

fn web_url(value: &str) -> Result<(), ValidationError> {
    if is_web_url(value) {
        Ok(())
    } else {
        Err(ValidationError::new("web_url"))
    }
}

fn optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    match blank_as_none(deserializer)? {
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("'{raw}' is not a category id"))),
        None => Ok(None),
    }
}

fn checkbox<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(blank_as_none(deserializer)?.is_some_and(|v| v != "false" && v != "0"))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignInForm {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "Enter your password."))]
    pub password: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignUpForm {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 8, message = "Passwords must be at least 8 characters."))]
    pub password: String,
    pub confirm_password: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub account_type: Option<String>,
}

impl SignUpForm {
    pub fn validate_business_rules(&self) -> Result<(), String> {
        if self.password != self.confirm_password {
            return Err("Passwords do not match.".into());
        }
        Ok(())
    }

    pub fn role(&self) -> Role {
        match self.account_type.as_deref() {
            Some("business") => Role::Business,
            _ => Role::User,
        }
    }
}

/// Business dashboard form for creating or editing an experience.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ExperienceForm {
    #[validate(length(min = 3, max = 120, message = "Titles must be 3 to 120 characters."))]
    pub title: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 280, message = "Short descriptions are limited to 280 characters."))]
    pub short_description: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 4000, message = "Descriptions are limited to 4000 characters."))]
    pub long_description: Option<String>,
    #[validate(length(min = 2, max = 60, message = "Choose a county."))]
    pub county: String,
    #[serde(default, deserialize_with = "optional_number")]
    #[validate(range(min = 0.0, message = "Prices cannot be negative."))]
    pub price_min: Option<f64>,
    #[serde(default, deserialize_with = "optional_number")]
    #[validate(range(min = 0.0, message = "Prices cannot be negative."))]
    pub price_max: Option<f64>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(custom(function = "web_url", message = "Booking links must be full http(s) URLs."))]
    pub booking_url: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 60))]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "optional_id")]
    pub category_id: Option<i64>,
    #[serde(default, deserialize_with = "checkbox")]
    pub submit_for_review: bool,
}

impl ExperienceForm {
    pub fn validate_business_rules(&self) -> Result<(), String> {
        if let (Some(min), Some(max)) = (self.price_min, self.price_max) {
            if max < min {
                return Err("The maximum price must not be below the minimum price.".into());
            }
        }
        if self.price_max.is_some() && self.price_min.is_none() {
            return Err("Enter a minimum price before a maximum price.".into());
        }
        Ok(())
    }

    fn requested_status(&self) -> ExperienceStatus {
        if self.submit_for_review {
            ExperienceStatus::Pending
        } else {
            ExperienceStatus::Draft
        }
    }

    pub fn into_new_experience(self, business_id: Uuid) -> NewExperience {
        let status = self.requested_status();
        NewExperience {
            id: Uuid::new_v4(),
            business_id,
            title: self.title.trim().to_string(),
            short_description: self.short_description,
            long_description: self.long_description,
            county: self.county.trim().to_string(),
            price_min: self.price_min,
            price_max: self.price_max,
            status,
            is_published: true,
            booking_url: self.booking_url,
            duration: self.duration,
            created_at: Utc::now(),
        }
    }

    /// Column patch for an edit. Approved listings go back to review when
    /// their content changes.
    pub fn to_patch(&self, existing: &Experience) -> serde_json::Value {
        let status = if self.submit_for_review || existing.status == ExperienceStatus::Approved {
            ExperienceStatus::Pending
        } else {
            existing.status
        };

        serde_json::json!({
            "title": self.title.trim(),
            "short_description": self.short_description,
            "long_description": self.long_description,
            "county": self.county.trim(),
            "price_min": self.price_min,
            "price_max": self.price_max,
            "booking_url": self.booking_url,
            "duration": self.duration,
            "status": status,
        })
    }

    pub fn from_existing(listing: &ExperienceListing) -> Self {
        let e = &listing.experience;
        Self {
            title: e.title.clone(),
            short_description: e.short_description.clone(),
            long_description: e.long_description.clone(),
            county: e.county.clone().unwrap_or_default(),
            price_min: e.price_min,
            price_max: e.price_max,
            booking_url: e.booking_url.clone(),
            duration: e.duration.clone(),
            category_id: listing.category_ids.first().copied(),
            submit_for_review: false,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct BusinessProfileForm {
    #[validate(length(min = 2, max = 120, message = "Business names must be 2 to 120 characters."))]
    pub name: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(custom(function = "web_url", message = "Websites must be full http(s) URLs."))]
    pub website: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(custom(function = "web_url", message = "Logo links must be full http(s) URLs."))]
    pub logo_url: Option<String>,
}

impl BusinessProfileForm {
    pub fn from_existing(business: &Business) -> Self {
        Self {
            name: business.name.clone(),
            website: business.website.clone(),
            description: business.description.clone(),
            logo_url: business.logo_url.clone(),
        }
    }

    /// Upsert row keyed by the owning user.
    pub fn to_row(&self, user_id: Uuid) -> serde_json::Value {
        serde_json::json!({
            "user_id": user_id,
            "name": self.name.trim(),
            "website": self.website,
            "description": self.description,
            "logo_url": self.logo_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_parses_case_insensitively() {
        let exp: Experience = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "title": "Cliff walk",
            "status": "APPROVED",
            "is_published": true
        }))
        .unwrap();
        assert_eq!(exp.status, ExperienceStatus::Approved);
        assert!(exp.is_publicly_visible());
        assert_eq!(" Pending ".parse::<ExperienceStatus>(), Ok(ExperienceStatus::Pending));
        assert!("archived".parse::<ExperienceStatus>().is_err());
    }

    #[test]
    fn schema_restricts_status_to_known_values() {
        let schema = include_str!("../schema/001_core.sql");
        let check = "CHECK (lower(status) IN ('draft', 'pending', 'approved', 'rejected'))";
        assert!(schema.contains(check));
        for status in ExperienceStatus::ALL {
            assert!(check.contains(&format!("'{}'", status.as_str())));
        }
    }

    #[test]
    fn unpublished_or_unapproved_rows_are_not_public() {
        let mut exp: Experience = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "title": "Cliff walk",
            "status": "approved",
            "is_published": false
        }))
        .unwrap();
        assert!(!exp.is_publicly_visible());
        exp.is_published = true;
        exp.status = ExperienceStatus::Pending;
        assert!(!exp.is_publicly_visible());
    }

    #[test]
    fn sign_up_rejects_mismatched_passwords() {
        let form = SignUpForm {
            email: "a@b.ie".into(),
            password: "longenough".into(),
            confirm_password: "different1".into(),
            account_type: None,
        };
        assert!(form.validate().is_ok());
        assert_eq!(form.validate_business_rules(), Err("Passwords do not match.".into()));
    }

    #[test]
    fn sign_in_rejects_malformed_email() {
        let form = SignInForm {
            email: "not-an-email".into(),
            password: "x".into(),
            next: None,
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn experience_form_rejects_inverted_price_range() {
        let form = ExperienceForm {
            title: "Sea kayaking".into(),
            county: "Cork".into(),
            price_min: Some(80.0),
            price_max: Some(40.0),
            ..Default::default()
        };
        assert!(form.validate().is_ok());
        assert!(form.validate_business_rules().is_err());
    }

    #[test]
    fn editing_an_approved_experience_returns_it_to_review() {
        let existing: Experience = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "title": "Cliff walk",
            "status": "approved",
            "is_published": true
        }))
        .unwrap();
        let form = ExperienceForm {
            title: "Cliff walk at dawn".into(),
            county: "Clare".into(),
            ..Default::default()
        };
        assert_eq!(form.to_patch(&existing)["status"], "pending");
    }

    #[test]
    fn new_experience_status_follows_submit_flag() {
        let business_id = Uuid::new_v4();
        let draft = ExperienceForm {
            title: "Pottery".into(),
            county: "Galway".into(),
            ..Default::default()
        }
        .into_new_experience(business_id);
        assert_eq!(draft.status, ExperienceStatus::Draft);

        let submitted = ExperienceForm {
            title: "Pottery".into(),
            county: "Galway".into(),
            submit_for_review: true,
            ..Default::default()
        }
        .into_new_experience(business_id);
        assert_eq!(submitted.status, ExperienceStatus::Pending);
    }

    #[test]
    fn blank_form_fields_deserialize_as_absent() {
        let form: ExperienceForm = serde_json::from_value(json!({
            "title": "Pottery",
            "county": "Galway",
            "price_min": "",
            "price_max": " ",
            "booking_url": "",
            "category_id": "3",
            "submit_for_review": "on"
        }))
        .unwrap();
        assert_eq!(form.price_min, None);
        assert_eq!(form.price_max, None);
        assert_eq!(form.booking_url, None);
        assert_eq!(form.category_id, Some(3));
        assert!(form.submit_for_review);
    }

    #[test]
    fn links_must_use_http_or_https() {
        let profile = BusinessProfileForm {
            name: "Wild Atlantic Tours".into(),
            website: Some("javascript:alert(document.domain)".into()),
            ..Default::default()
        };
        assert!(profile.validate().is_err());

        let profile = BusinessProfileForm {
            name: "Wild Atlantic Tours".into(),
            website: Some("https://wildatlantic.example.ie".into()),
            logo_url: Some("data:text/html,<b>x</b>".into()),
            ..Default::default()
        };
        assert!(profile.validate().is_err());

        let form = ExperienceForm {
            title: "Sea kayaking".into(),
            county: "Cork".into(),
            booking_url: Some("http://book.example.ie/slot".into()),
            ..Default::default()
        };
        assert!(form.validate().is_ok());
        assert!(!is_web_url("ftp://files.example.ie"));
    }

    #[test]
    fn non_finite_prices_are_rejected() {
        for raw in ["NaN", "inf", "-infinity"] {
            let parsed = serde_json::from_value::<ExperienceForm>(json!({
                "title": "Pottery",
                "county": "Galway",
                "price_min": raw
            }));
            assert!(parsed.is_err(), "{raw} was accepted");
        }
    }
}
