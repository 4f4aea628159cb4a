use actix_web::{get, http::header, post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::{html, notice, see_other, NoticeParams};
use crate::context::PageContext;
use crate::errors::AppError;
use crate::favorites;
use crate::filters::{FilterParams, FilterSelection};
use crate::gate::require_user;
use crate::local_store::CookieStore;
use crate::metrics::{self, MetricHit};
use crate::models::{is_web_url, Experience, ExperienceListing, MetricKind};
use crate::render::{self, pages, ResultsState};
use crate::search::{self, SearchOptions, SearchOutcome};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SourceParams {
    pub source: Option<String>,
}

fn public_options(state: &AppState) -> SearchOptions {
    SearchOptions {
        limit: state.config.result_limit,
        ..SearchOptions::default()
    }
}

// ============================================================================
// FINDER
// ============================================================================

#[get("/")]
pub async fn home(
    req: HttpRequest,
    state: web::Data<AppState>,
    params: web::Query<FilterParams>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let selection = FilterSelection::from_params(&params);
    Ok(html(pages::home(&ctx, &selection)))
}

/// Results container only; the home page loads this after first paint.
#[get("/experiences/results")]
pub async fn results_fragment(
    req: HttpRequest,
    state: web::Data<AppState>,
    params: web::Query<FilterParams>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let selection = FilterSelection::from_params(&params);
    let outcome = search::search(&state.db, &ctx.auth, &selection, public_options(&state)).await;
    let body = render::results(ResultsState::from(&outcome), selection.source.as_deref());
    Ok(html(body))
}

#[get("/experiences")]
pub async fn experiences(
    req: HttpRequest,
    state: web::Data<AppState>,
    params: web::Query<FilterParams>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let selection = FilterSelection::from_params(&params);
    let outcome = search::search(&state.db, &ctx.auth, &selection, public_options(&state)).await;
    Ok(html(pages::experiences_page(
        &ctx,
        &selection,
        ResultsState::from(&outcome),
    )))
}

/// Owners and admins may preview listings that are not public yet.
async fn can_view(state: &AppState, ctx: &PageContext, experience: &Experience) -> bool {
    if experience.is_publicly_visible() || ctx.is_admin() {
        return true;
    }
    let (Some(user_id), Some(owner)) = (ctx.user_id(), experience.business_id) else {
        return false;
    };
    match state.db.business_for_user(&ctx.auth, user_id).await {
        Ok(Some(business)) => business.id == owner,
        Ok(None) => false,
        Err(err) => {
            log::warn!("Ownership check failed for experience {}: {err}", experience.id);
            false
        }
    }
}

async fn visible_listing(
    state: &AppState,
    ctx: &PageContext,
    experience_id: Uuid,
) -> Result<ExperienceListing, AppError> {
    let listing = state
        .db
        .get_listing(&ctx.auth, experience_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if !can_view(state, ctx, &listing.experience).await {
        return Err(AppError::NotFound);
    }
    Ok(listing)
}

#[get("/experiences/{experience_id}")]
pub async fn experience_detail(
    req: HttpRequest,
    state: web::Data<AppState>,
    experience_id: web::Path<Uuid>,
    params: web::Query<SourceParams>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let listing = visible_listing(&state, &ctx, experience_id.into_inner()).await?;
    let experience = &listing.experience;

    let mut store = CookieStore::from_request(&req, state.config.cookie_secure);
    if experience.is_publicly_visible() {
        metrics::record(
            &state.db,
            &ctx.auth,
            &mut store,
            ctx.user_id(),
            MetricHit {
                experience_id: experience.id,
                business_id: experience.business_id,
                kind: MetricKind::View,
                source: params.source.clone(),
            },
            Utc::now(),
        )
        .await;
    }

    let favorited = match ctx.user_id() {
        Some(user_id) => state
            .db
            .favorite_exists(&ctx.auth, user_id, experience.id)
            .await
            .unwrap_or_else(|err| {
                log::warn!("Failed to load favorite state for {}: {err}", experience.id);
                false
            }),
        None => false,
    };

    let mut response = html(pages::experience_detail(
        &ctx,
        &listing,
        favorited,
        params.source.as_deref(),
    ));
    store.apply(&mut response);
    Ok(response)
}

/// Records the booking click and sends the visitor on to the business's
/// booking page. The redirect happens whether or not recording worked.
#[get("/experiences/{experience_id}/book")]
pub async fn book_experience(
    req: HttpRequest,
    state: web::Data<AppState>,
    experience_id: web::Path<Uuid>,
    params: web::Query<SourceParams>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let experience_id = experience_id.into_inner();
    let experience = state
        .db
        .get_experience(&ctx.auth, experience_id)
        .await?
        .filter(|e| e.is_publicly_visible())
        .ok_or(AppError::NotFound)?;

    let Some(booking_url) = experience.booking_url.clone().filter(|url| is_web_url(url)) else {
        return Ok(see_other(&format!("/experiences/{experience_id}")));
    };

    let mut store = CookieStore::from_request(&req, state.config.cookie_secure);
    metrics::record(
        &state.db,
        &ctx.auth,
        &mut store,
        ctx.user_id(),
        MetricHit {
            experience_id,
            business_id: experience.business_id,
            kind: MetricKind::BookingClick,
            source: params.source.clone(),
        },
        Utc::now(),
    )
    .await;

    let mut response = HttpResponse::Found()
        .insert_header((header::LOCATION, booking_url))
        .finish();
    store.apply(&mut response);
    Ok(response)
}

// ============================================================================
// FAVORITES
// ============================================================================

#[get("/favorites")]
pub async fn list_favorites(
    req: HttpRequest,
    state: web::Data<AppState>,
    params: web::Query<NoticeParams>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let user = require_user(&ctx)?;

    let outcome = match favorites::list(&state.db, &ctx.auth, user.id).await {
        Ok(listings) if listings.is_empty() => SearchOutcome::Empty,
        Ok(listings) => SearchOutcome::Results(listings),
        Err(err) => {
            log::error!("Failed to load favorites for {}: {err:?}", user.id);
            SearchOutcome::Unavailable
        }
    };
    let flash = notice(params.notice.as_deref());
    Ok(html(pages::favorites_page(
        &ctx,
        ResultsState::from(&outcome),
        flash.as_ref(),
    )))
}

/// Same-site relative path to return to, if the referer gives one.
fn return_path(req: &HttpRequest) -> Option<String> {
    let referer = req.headers().get(header::REFERER)?.to_str().ok()?;
    let url = reqwest::Url::parse(referer).ok()?;
    let host = req.connection_info().host().to_string();
    let same_host = match url.port() {
        Some(port) => format!("{}:{port}", url.host_str()?) == host,
        None => url.host_str() == Some(host.as_str()),
    };
    if !same_host {
        return None;
    }
    Some(match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    })
}

#[post("/favorites/{experience_id}/toggle")]
pub async fn toggle_favorite(
    req: HttpRequest,
    state: web::Data<AppState>,
    experience_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let user = require_user(&ctx)?;
    let experience_id = experience_id.into_inner();
    let back = return_path(&req).unwrap_or_else(|| format!("/experiences/{experience_id}"));

    let Some(_ticket) = state.guard.try_acquire(format!("{}:favorite:{experience_id}", user.id))
    else {
        return Ok(see_other(&back));
    };

    match favorites::toggle(&state.db, &ctx.auth, user.id, experience_id).await {
        Ok(saved) => {
            log::info!("User {} favorite {experience_id} -> {saved}", user.id);
            Ok(see_other(&back))
        }
        Err(err) => {
            log::error!("Failed to toggle favorite {experience_id}: {err:?}");
            Ok(see_other("/favorites?notice=favorite_failed"))
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{cookie::Cookie, test, App};
    use serde_json::json;

    use super::super::{configure, test_support};
    use super::*;

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_rt::test]
    async fn home_renders_loading_state_and_guest_nav() {
        let (_, state) = test_support::state();
        let app = app!(state);
        let body = test::call_and_read_body(&app, test::TestRequest::get().uri("/").to_request()).await;
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains(render::LOADING_MESSAGE));
        assert!(body.contains(r#"data-nav="guest""#));
    }

    #[actix_rt::test]
    async fn outdoors_dublin_mid_budget_finds_the_walking_tour() {
        let (backend, state) = test_support::state();
        let business = Uuid::new_v4();
        let tour = test_support::experience("Walking tour", business, "approved", 75.0);
        let pricey = test_support::experience("Helicopter ride", business, "approved", 250.0);
        let tour_id = tour["id"].clone();
        let pricey_id = pricey["id"].clone();
        backend.seed("experiences", vec![tour, pricey]);
        backend.seed(
            "experience_categories",
            vec![
                json!({ "experience_id": tour_id, "category_id": 1 }),
                json!({ "experience_id": pricey_id, "category_id": 1 }),
            ],
        );
        let app = app!(state);

        let body = test::call_and_read_body(
            &app,
            test::TestRequest::get()
                .uri("/experiences/results?category=Outdoors&county=Dublin&budget=50_100")
                .to_request(),
        )
        .await;
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("Walking tour"));
        assert!(!body.contains("Helicopter ride"));
        assert!(body.contains("€75"));
    }

    #[actix_rt::test]
    async fn failed_search_shows_error_state() {
        let (backend, state) = test_support::state();
        backend.set_offline(true);
        let app = app!(state);
        let body = test::call_and_read_body(
            &app,
            test::TestRequest::get().uri("/experiences").to_request(),
        )
        .await;
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains(render::ERROR_MESSAGE));
    }

    #[actix_rt::test]
    async fn repeat_anonymous_view_is_recorded_once() {
        let (backend, state) = test_support::state();
        let row = test_support::experience("Kayak trip", Uuid::new_v4(), "approved", 40.0);
        let id = row["id"].as_str().unwrap().to_string();
        backend.seed("experiences", vec![row]);
        let app = app!(state);

        let first = test::call_service(
            &app,
            test::TestRequest::get().uri(&format!("/experiences/{id}")).to_request(),
        )
        .await;
        assert!(first.status().is_success());
        let cookies: Vec<Cookie<'static>> = first
            .response()
            .cookies()
            .map(|c| Cookie::new(c.name().to_string(), c.value().to_string()))
            .collect();
        assert!(!cookies.is_empty());

        let mut second = test::TestRequest::get().uri(&format!("/experiences/{id}"));
        for cookie in cookies {
            second = second.cookie(cookie);
        }
        let resp = test::call_service(&app, second.to_request()).await;
        assert!(resp.status().is_success());

        assert_eq!(backend.rows("experience_events").len(), 1);
    }

    #[actix_rt::test]
    async fn hidden_experience_is_not_found_for_guests() {
        let (backend, state) = test_support::state();
        let row = test_support::experience("Draft walk", Uuid::new_v4(), "pending", 10.0);
        let id = row["id"].as_str().unwrap().to_string();
        backend.seed("experiences", vec![row]);
        let app = app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri(&format!("/experiences/{id}")).to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_rt::test]
    async fn booking_link_redirects_and_records_click() {
        let (backend, state) = test_support::state();
        let row = test_support::experience("Food tour", Uuid::new_v4(), "approved", 60.0);
        let id = row["id"].as_str().unwrap().to_string();
        backend.seed("experiences", vec![row]);
        let app = app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri(&format!("/experiences/{id}/book?source=newsletter"))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::FOUND);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "https://book.example.ie/slot"
        );
        let events = backend.rows("experience_events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["event_type"], "booking_click");
        assert_eq!(events[0]["source"], "newsletter");
    }

    #[actix_rt::test]
    async fn booking_still_redirects_when_recording_fails() {
        let (backend, state) = test_support::state();
        let row = test_support::experience("Food tour", Uuid::new_v4(), "approved", 60.0);
        let id = row["id"].as_str().unwrap().to_string();
        backend.seed("experiences", vec![row]);
        backend.declare_unique("experience_events", &["experience_id"]);
        backend.seed(
            "experience_events",
            vec![json!({ "experience_id": id, "event_type": "view", "session_id": "x" })],
        );
        let app = app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri(&format!("/experiences/{id}/book")).to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::FOUND);
        assert_eq!(backend.rows("experience_events").len(), 1);
    }

    #[actix_rt::test]
    async fn booking_refuses_non_web_links() {
        let (backend, state) = test_support::state();
        let mut row = test_support::experience("Food tour", Uuid::new_v4(), "approved", 60.0);
        row["booking_url"] = json!("javascript:alert(1)");
        let id = row["id"].as_str().unwrap().to_string();
        backend.seed("experiences", vec![row]);
        let app = app!(state);

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri(&format!("/experiences/{id}/book")).to_request(),
        )
        .await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::SEE_OTHER);
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap().to_str().unwrap(),
            format!("/experiences/{id}")
        );
        assert!(backend.rows("experience_events").is_empty());
    }

    #[actix_rt::test]
    async fn favorites_require_sign_in() {
        let (_, state) = test_support::state();
        let app = app!(state);
        let resp = test::call_service(&app, test::TestRequest::get().uri("/favorites").to_request()).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::SEE_OTHER);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/login");
    }

    #[actix_rt::test]
    async fn toggling_favorite_twice_leaves_nothing_saved() {
        let (backend, state) = test_support::state();
        let (_, cookie) = test_support::sign_in_as(&backend, "fan@example.ie", "user");
        let row = test_support::experience("Cooking class", Uuid::new_v4(), "approved", 45.0);
        let id = row["id"].as_str().unwrap().to_string();
        backend.seed("experiences", vec![row]);
        let app = app!(state);

        for expected in [1, 0] {
            let resp = test::call_service(
                &app,
                test::TestRequest::post()
                    .uri(&format!("/favorites/{id}/toggle"))
                    .cookie(cookie.clone())
                    .to_request(),
            )
            .await;
            assert_eq!(resp.status(), actix_web::http::StatusCode::SEE_OTHER);
            assert_eq!(backend.rows("favorites").len(), expected);
        }
    }
}
