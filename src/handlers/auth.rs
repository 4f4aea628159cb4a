use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{get, http::header, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use super::{bad_request_html, html, notice, validation_message};
use crate::backend::{Auth, BackendError};
use crate::context::{PageContext, SESSION_COOKIE};
use crate::errors::AppError;
use crate::gate::{landing_for, resolve_role};
use crate::models::{Profile, Role, SignInForm, SignUpForm};
use crate::render::{pages, Alert};
use crate::state::AppState;

const SESSION_MAX_AGE_DAYS: i64 = 7;

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::days(SESSION_MAX_AGE_DAYS))
        .finish()
}

fn cleared_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .secure(secure)
        .max_age(CookieDuration::ZERO)
        .finish()
}

/// Only same-site absolute paths are followed after sign-in.
fn safe_next(next: Option<&str>) -> Option<&str> {
    next.filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
}

fn signed_in_redirect(location: &str, token: String, secure: bool) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .cookie(session_cookie(token, secure))
        .finish()
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    pub next: Option<String>,
    pub notice: Option<String>,
}

// ============================================================================
// SIGN IN
// ============================================================================

#[get("/login")]
pub async fn login_form(
    req: HttpRequest,
    state: web::Data<AppState>,
    params: web::Query<LoginParams>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    if ctx.user.is_some() {
        return Ok(super::see_other(landing_for(ctx.role)));
    }
    let flash = notice(params.notice.as_deref());
    Ok(html(pages::login_page(
        &ctx,
        flash.as_ref(),
        None,
        safe_next(params.next.as_deref()),
    )))
}

#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    form: web::Form<SignInForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let guest = PageContext::guest();
    let next = safe_next(form.next.as_deref());
    let retry = |message: String| {
        let alert = Alert::error(message);
        bad_request_html(pages::login_page(&guest, Some(&alert), Some(&form.email), next))
    };

    if let Err(e) = form.validate() {
        return Ok(retry(validation_message(&e)));
    }

    let session = match state.db.backend().sign_in(form.email.trim(), &form.password).await {
        Ok(session) => session,
        Err(BackendError::InvalidCredentials) => {
            return Ok(retry("Email or password is incorrect.".to_string()));
        }
        Err(err) => {
            log::error!("Sign-in failed: {err:?}");
            return Ok(retry("We couldn't sign you in right now. Please try again.".to_string()));
        }
    };

    let auth = Auth::Bearer(session.access_token.clone());
    let role = resolve_role(&state.db, &auth, session.user.id).await;
    log::info!("User {} signed in as {}", session.user.id, role.as_str());

    let location = next.unwrap_or_else(|| landing_for(Some(role)));
    Ok(signed_in_redirect(
        location,
        session.access_token,
        state.config.cookie_secure,
    ))
}

// ============================================================================
// SIGN UP
// ============================================================================

#[get("/signup")]
pub async fn signup_form(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    if ctx.user.is_some() {
        return Ok(super::see_other(landing_for(ctx.role)));
    }
    Ok(html(pages::signup_page(&ctx, None, None, None)))
}

#[post("/signup")]
pub async fn signup(
    state: web::Data<AppState>,
    form: web::Form<SignUpForm>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let guest = PageContext::guest();
    let retry = |message: &str| {
        let alert = Alert::error(message);
        bad_request_html(pages::signup_page(
            &guest,
            Some(&alert),
            Some(&form.email),
            form.account_type.as_deref(),
        ))
    };

    if let Err(e) = form.validate() {
        return Ok(retry(&validation_message(&e)));
    }
    if let Err(message) = form.validate_business_rules() {
        return Ok(retry(&message));
    }

    let email = form.email.trim().to_lowercase();
    let Some(_ticket) = state.guard.try_acquire(format!("signup:{email}")) else {
        return Ok(retry("That form is already being submitted."));
    };

    let role = form.role();
    let metadata = json!({ "account_type": role.as_str() });
    let session = match state.db.backend().sign_up(&email, &form.password, metadata).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            let alert = Alert::info("Check your email to confirm your account, then sign in.");
            return Ok(html(pages::login_page(&guest, Some(&alert), Some(&email), None)));
        }
        Err(BackendError::Conflict(_)) => {
            return Ok(retry("An account with that email already exists."));
        }
        Err(err) => {
            log::error!("Sign-up failed: {err:?}");
            return Ok(retry("We couldn't create your account right now. Please try again."));
        }
    };

    let auth = Auth::Bearer(session.access_token.clone());
    let profile = Profile {
        id: session.user.id,
        role,
    };
    if let Err(err) = state.db.upsert_profile(&auth, profile).await {
        // The account exists; the role falls back to the default until fixed.
        log::error!("Failed to store profile for {}: {err:?}", session.user.id);
    }
    log::info!("Registered {} as {}", session.user.id, role.as_str());

    let location = match role {
        Role::Business => "/business",
        _ => "/",
    };
    Ok(signed_in_redirect(
        location,
        session.access_token,
        state.config.cookie_secure,
    ))
}

// ============================================================================
// SIGN OUT
// ============================================================================

#[post("/logout")]
pub async fn logout(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        if let Err(err) = state.db.backend().sign_out(cookie.value()).await {
            log::warn!("Sign-out call failed, clearing cookie anyway: {err}");
        }
    }
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/login?notice=signed_out"))
        .cookie(cleared_session_cookie(state.config.cookie_secure))
        .finish()
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::{test as actix_test, App};
    use serde_json::json;

    use super::super::{configure, test_support};
    use super::*;
    use crate::backend::Backend;

    macro_rules! app {
        ($state:expr) => {
            actix_test::init_service(
                App::new()
                    .app_data(web::Data::new($state))
                    .configure(configure),
            )
            .await
        };
    }

    #[test]
    fn next_must_be_a_local_path() {
        assert_eq!(safe_next(Some("/favorites")), Some("/favorites"));
        assert_eq!(safe_next(Some("//evil.example")), None);
        assert_eq!(safe_next(Some("https://evil.example")), None);
        assert_eq!(safe_next(None), None);
    }

    #[actix_rt::test]
    async fn business_sign_up_stores_role_and_sets_session() {
        let (backend, state) = test_support::state();
        let app = app!(state);

        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri("/signup")
                .set_form(json!({
                    "email": "owner@cafe.ie",
                    "password": "password1",
                    "confirm_password": "password1",
                    "account_type": "business",
                }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/business");
        assert!(resp.response().cookies().any(|c| c.name() == SESSION_COOKIE));

        let profiles = backend.rows("profiles");
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0]["role"], "business");
    }

    #[actix_rt::test]
    async fn mismatched_passwords_stay_on_the_form() {
        let (backend, state) = test_support::state();
        let app = app!(state);

        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri("/signup")
                .set_form(json!({
                    "email": "a@b.ie",
                    "password": "password1",
                    "confirm_password": "password2",
                }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = String::from_utf8(actix_test::read_body(resp).await.to_vec()).unwrap();
        assert!(body.contains("Passwords do not match."));
        assert!(backend.rows("profiles").is_empty());
    }

    #[actix_rt::test]
    async fn wrong_password_shows_inline_alert() {
        let (backend, state) = test_support::state();
        backend.register_user("a@b.ie", "password1");
        let app = app!(state);

        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri("/login")
                .set_form(json!({ "email": "a@b.ie", "password": "nope" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = String::from_utf8(actix_test::read_body(resp).await.to_vec()).unwrap();
        assert!(body.contains("Email or password is incorrect."));
    }

    #[actix_rt::test]
    async fn sign_in_lands_on_role_page() {
        let (backend, state) = test_support::state();
        let session = backend.register_user("admin@site.ie", "password1");
        backend.seed("profiles", vec![json!({ "id": session.user.id, "role": "admin" })]);
        let app = app!(state);

        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::post()
                .uri("/login")
                .set_form(json!({ "email": "admin@site.ie", "password": "password1" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/admin");
    }

    #[actix_rt::test]
    async fn logout_clears_the_session() {
        let (backend, state) = test_support::state();
        let (_, cookie) = test_support::sign_in_as(&backend, "a@b.ie", "user");
        let token = cookie.value().to_string();
        let app = app!(state);

        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::post().uri("/logout").cookie(cookie).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        let cleared = resp
            .response()
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .unwrap();
        assert_eq!(cleared.value(), "");
        assert!(backend.current_user(&token).await.unwrap().is_none());
    }
}
