pub mod admin;
pub mod auth;
pub mod business;
pub mod pages;

use actix_web::{get, http::header, web, HttpResponse, Responder};
use serde::Deserialize;
use validator::ValidationErrors;

use crate::errors::AppError;
use crate::render::Alert;

/// Largest accepted image upload.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="640" height="400" viewBox="0 0 640 400"><rect width="640" height="400" fill="#e6ece8"/><path d="M220 270l70-90 50 60 35-40 65 70z" fill="#b8c7be"/><circle cx="410" cy="150" r="28" fill="#b8c7be"/></svg>"##;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::FormConfig::default().error_handler(|err, _req| {
        log::warn!("Rejected form payload: {err}");
        AppError::Validation(err.to_string()).into()
    }))
    .app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES))
    // Health
    .service(health_check)
    .service(placeholder_image)
    // Finder
    .service(pages::home)
    .service(pages::results_fragment)
    .service(pages::experiences)
    .service(pages::book_experience)
    .service(pages::experience_detail)
    .service(pages::list_favorites)
    .service(pages::toggle_favorite)
    // Auth
    .service(auth::login_form)
    .service(auth::login)
    .service(auth::signup_form)
    .service(auth::signup)
    .service(auth::logout)
    // Business dashboard
    .service(business::dashboard)
    .service(business::metrics_series)
    .service(business::save_profile)
    .service(business::new_experience)
    .service(business::create_experience)
    .service(business::edit_experience)
    .service(business::update_experience)
    .service(business::delete_experience)
    .service(business::upload_image)
    .service(business::set_primary_image)
    // Admin
    .service(admin::dashboard)
    .service(admin::approve_experience)
    .service(admin::reject_experience)
    .service(admin::delete_experience);
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

pub(crate) fn html(body: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

pub(crate) fn bad_request_html(body: String) -> HttpResponse {
    HttpResponse::BadRequest()
        .content_type("text/html; charset=utf-8")
        .body(body)
}

pub(crate) fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// First human-readable message out of a validator failure.
pub(crate) fn validation_message(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .iter()
        .flat_map(|(_, errs)| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "Please check the form and try again.".to_string())
}

/// Status codes carried across a redirect. Only known codes produce text.
#[derive(Debug, Default, Deserialize)]
pub struct NoticeParams {
    pub notice: Option<String>,
}

pub(crate) fn notice(code: Option<&str>) -> Option<Alert> {
    let alert = match code? {
        "created" => Alert::success("Experience saved."),
        "saved" => Alert::success("Changes saved."),
        "submitted" => Alert::success("Submitted for review. We'll let you know once it's approved."),
        "deleted" => Alert::success("Experience deleted."),
        "primary" => Alert::success("Primary image updated."),
        "profile_saved" => Alert::success("Business profile saved."),
        "profile_required" => Alert::info("Save your business profile before adding experiences."),
        "approved" => Alert::success("Experience approved."),
        "rejected" => Alert::info("Experience rejected."),
        "signed_out" => Alert::info("You have been signed out."),
        "busy" => Alert::error("That form is already being submitted."),
        "favorite_failed" => Alert::error("We couldn't update your favorites. Please try again."),
        _ => return None,
    };
    Some(alert)
}

// ============================================================================
// HEALTH CHECK
// ============================================================================

#[get("/health")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "experience-finder",
        "timestamp": chrono::Utc::now()
    }))
}

#[get("/static/placeholder.svg")]
pub async fn placeholder_image() -> impl Responder {
    HttpResponse::Ok()
        .content_type("image/svg+xml")
        .insert_header((header::CACHE_CONTROL, "public, max-age=86400"))
        .body(PLACEHOLDER_SVG)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use actix_web::cookie::Cookie;
    use serde_json::{json, Value};
    use uuid::Uuid;

    use crate::backend::MemoryBackend;
    use crate::config::AppConfig;
    use crate::context::SESSION_COOKIE;
    use crate::database::Database;
    use crate::state::AppState;

    pub fn state() -> (Arc<MemoryBackend>, AppState) {
        let backend = Arc::new(MemoryBackend::new());
        let state = AppState::new(Database::new(backend.clone()), AppConfig::default());
        (backend, state)
    }

    /// Registers a user with the given role and returns their session cookie.
    pub fn sign_in_as(backend: &MemoryBackend, email: &str, role: &str) -> (Uuid, Cookie<'static>) {
        let session = backend.register_user(email, "password1");
        backend.seed("profiles", vec![json!({ "id": session.user.id, "role": role })]);
        (
            session.user.id,
            Cookie::new(SESSION_COOKIE, session.access_token),
        )
    }

    pub fn experience(title: &str, business_id: Uuid, status: &str, price_min: f64) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "business_id": business_id,
            "title": title,
            "long_description": format!("{title} with local guides"),
            "county": "Dublin",
            "price_min": price_min,
            "status": status,
            "is_published": true,
            "booking_url": "https://book.example.ie/slot",
        })
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{test as actix_test, App};

    use super::*;

    #[actix_rt::test]
    async fn health_and_placeholder_respond() {
        let (_, state) = test_support::state();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        let resp = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/health").to_request()).await;
        assert!(resp.status().is_success());

        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::get().uri("/static/placeholder.svg").to_request(),
        )
        .await;
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/svg+xml");
    }

    #[test]
    fn unknown_notice_codes_are_ignored() {
        assert!(notice(Some("<script>")).is_none());
        assert!(notice(None).is_none());
        assert_eq!(notice(Some("approved")).unwrap().message, "Experience approved.");
    }
}
