use actix_web::{get, http::header, post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{bad_request_html, html, notice, see_other, validation_message, NoticeParams, MAX_UPLOAD_BYTES};
use crate::backend::AuthUser;
use crate::context::PageContext;
use crate::errors::AppError;
use crate::gate::require_role;
use crate::metrics::{self, DEFAULT_SERIES_DAYS};
use crate::models::{
    ApiResponse, Business, BusinessProfileForm, ExperienceForm, ExperienceImage,
    ExperienceListing, MetricsSeries, Role,
};
use crate::render::{pages, Alert};
use crate::state::AppState;

const DASHBOARD_ROLES: &[Role] = &[Role::Business, Role::Admin];

/// Longest chart window the dashboard will ask for.
const MAX_SERIES_DAYS: u32 = 90;

fn require_business_user(ctx: &PageContext) -> Result<AuthUser, AppError> {
    require_role(ctx, DASHBOARD_ROLES).cloned()
}

async fn load_business(
    state: &AppState,
    ctx: &PageContext,
    user: &AuthUser,
) -> Result<Option<Business>, AppError> {
    Ok(state.db.business_for_user(&ctx.auth, user.id).await?)
}

/// The caller's business and one of its experiences. Experiences owned by
/// someone else look the same as missing ones.
async fn owned_listing(
    state: &AppState,
    ctx: &PageContext,
    user: &AuthUser,
    experience_id: Uuid,
) -> Result<(Business, ExperienceListing), AppError> {
    let business = load_business(state, ctx, user)
        .await?
        .ok_or(AppError::NotFound)?;
    let listing = state
        .db
        .get_listing(&ctx.auth, experience_id)
        .await?
        .filter(|l| l.experience.business_id == Some(business.id))
        .ok_or(AppError::NotFound)?;
    Ok((business, listing))
}

async fn render_dashboard(
    state: &AppState,
    ctx: &PageContext,
    user: &AuthUser,
    profile_override: Option<&BusinessProfileForm>,
    flash: Option<&Alert>,
) -> Result<String, AppError> {
    let business = load_business(state, ctx, user).await?;

    let (listings, series) = match &business {
        Some(business) => {
            let experiences = state
                .db
                .list_experiences_for_business(&ctx.auth, business.id)
                .await?;
            let listings = state.db.enrich(&ctx.auth, experiences).await?;
            let series = match metrics::load_business_series(
                &state.db,
                &ctx.auth,
                business.id,
                DEFAULT_SERIES_DAYS,
                Utc::now(),
            )
            .await
            {
                Ok(series) => Some(series),
                Err(err) => {
                    log::error!("Failed to load metrics for business {}: {err:?}", business.id);
                    None
                }
            };
            (listings, series)
        }
        None => (Vec::new(), None),
    };

    let stored_profile = business
        .as_ref()
        .map(BusinessProfileForm::from_existing)
        .unwrap_or_default();
    let view = pages::BusinessDashboard {
        business: business.as_ref(),
        listings: &listings,
        series: series.as_ref(),
        profile: profile_override.unwrap_or(&stored_profile),
    };
    Ok(pages::business_dashboard(ctx, &view, flash))
}

// ============================================================================
// DASHBOARD
// ============================================================================

#[get("/business")]
pub async fn dashboard(
    req: HttpRequest,
    state: web::Data<AppState>,
    params: web::Query<NoticeParams>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let user = require_business_user(&ctx)?;
    let flash = notice(params.notice.as_deref());
    let body = render_dashboard(&state, &ctx, &user, None, flash.as_ref()).await?;
    Ok(html(body))
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsParams {
    pub days: Option<u32>,
}

/// Chart data for the dashboard.
#[get("/business/metrics")]
pub async fn metrics_series(
    req: HttpRequest,
    state: web::Data<AppState>,
    params: web::Query<MetricsParams>,
) -> HttpResponse {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let Ok(user) = require_business_user(&ctx) else {
        return HttpResponse::Unauthorized()
            .json(ApiResponse::<()>::error("Sign in with a business account".into()));
    };

    let days = params.days.unwrap_or(DEFAULT_SERIES_DAYS).clamp(1, MAX_SERIES_DAYS);
    let business = match state.db.business_for_user(&ctx.auth, user.id).await {
        Ok(Some(business)) => business,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Business profile not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch business for metrics: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to load metrics".into()));
        }
    };

    match metrics::load_business_series(&state.db, &ctx.auth, business.id, days, Utc::now()).await {
        Ok(series) => HttpResponse::Ok().json(ApiResponse::success(series)),
        Err(err) => {
            log::error!("Failed to load metrics for business {}: {err:?}", business.id);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<MetricsSeries>::error("Failed to load metrics".into()))
        }
    }
}

#[post("/business/profile")]
pub async fn save_profile(
    req: HttpRequest,
    state: web::Data<AppState>,
    form: web::Form<BusinessProfileForm>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let user = require_business_user(&ctx)?;
    let form = form.into_inner();

    if let Err(e) = form.validate() {
        let alert = Alert::error(validation_message(&e));
        let body = render_dashboard(&state, &ctx, &user, Some(&form), Some(&alert)).await?;
        return Ok(bad_request_html(body));
    }

    let Some(_ticket) = state.guard.try_acquire(format!("{}:profile", user.id)) else {
        return Ok(see_other("/business?notice=busy"));
    };

    let business = state.db.upsert_business(&ctx.auth, form.to_row(user.id)).await?;
    log::info!("Saved business profile {} for user {}", business.id, user.id);
    Ok(see_other("/business?notice=profile_saved"))
}

// ============================================================================
// EXPERIENCES
// ============================================================================

#[get("/business/experiences/new")]
pub async fn new_experience(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let user = require_business_user(&ctx)?;
    if load_business(&state, &ctx, &user).await?.is_none() {
        return Ok(see_other("/business?notice=profile_required"));
    }
    Ok(html(pages::experience_form_page(
        &ctx,
        &ExperienceForm::default(),
        None,
        None,
    )))
}

fn category_links(form: &ExperienceForm) -> Vec<i64> {
    form.category_id.into_iter().collect()
}

fn check_experience_form(form: &ExperienceForm) -> Result<(), String> {
    form.validate().map_err(|e| validation_message(&e))?;
    form.validate_business_rules()
}

#[post("/business/experiences")]
pub async fn create_experience(
    req: HttpRequest,
    state: web::Data<AppState>,
    form: web::Form<ExperienceForm>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let user = require_business_user(&ctx)?;
    let form = form.into_inner();

    if let Err(message) = check_experience_form(&form) {
        let alert = Alert::error(message);
        return Ok(bad_request_html(pages::experience_form_page(
            &ctx,
            &form,
            None,
            Some(&alert),
        )));
    }

    let Some(_ticket) = state.guard.try_acquire(format!("{}:experience:new", user.id)) else {
        return Err(AppError::DuplicateSubmission);
    };

    let Some(business) = load_business(&state, &ctx, &user).await? else {
        return Ok(see_other("/business?notice=profile_required"));
    };

    let categories = category_links(&form);
    let submitted = form.submit_for_review;
    let experience = state
        .db
        .create_experience(&ctx.auth, form.into_new_experience(business.id))
        .await?;
    if !categories.is_empty() {
        state
            .db
            .set_experience_categories(&ctx.auth, experience.id, &categories)
            .await?;
    }
    log::info!(
        "Business {} created experience {} ({})",
        business.id,
        experience.id,
        experience.status.as_str()
    );

    let code = if submitted { "submitted" } else { "created" };
    Ok(see_other(&format!(
        "/business/experiences/{}/edit?notice={code}",
        experience.id
    )))
}

#[get("/business/experiences/{experience_id}/edit")]
pub async fn edit_experience(
    req: HttpRequest,
    state: web::Data<AppState>,
    experience_id: web::Path<Uuid>,
    params: web::Query<NoticeParams>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let user = require_business_user(&ctx)?;
    let (_, listing) = owned_listing(&state, &ctx, &user, experience_id.into_inner()).await?;

    let form = ExperienceForm::from_existing(&listing);
    let flash = notice(params.notice.as_deref());
    Ok(html(pages::experience_form_page(
        &ctx,
        &form,
        Some((listing.experience.id, listing.images.as_slice())),
        flash.as_ref(),
    )))
}

#[post("/business/experiences/{experience_id}")]
pub async fn update_experience(
    req: HttpRequest,
    state: web::Data<AppState>,
    experience_id: web::Path<Uuid>,
    form: web::Form<ExperienceForm>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let user = require_business_user(&ctx)?;
    let (_, listing) = owned_listing(&state, &ctx, &user, experience_id.into_inner()).await?;
    let form = form.into_inner();
    let id = listing.experience.id;

    if let Err(message) = check_experience_form(&form) {
        let alert = Alert::error(message);
        return Ok(bad_request_html(pages::experience_form_page(
            &ctx,
            &form,
            Some((id, listing.images.as_slice())),
            Some(&alert),
        )));
    }

    let Some(_ticket) = state.guard.try_acquire(format!("{}:experience:{id}", user.id)) else {
        return Err(AppError::DuplicateSubmission);
    };

    let updated = state
        .db
        .update_experience(&ctx.auth, id, form.to_patch(&listing.experience))
        .await?
        .ok_or(AppError::NotFound)?;
    state
        .db
        .set_experience_categories(&ctx.auth, id, &category_links(&form))
        .await?;
    log::info!("Updated experience {id} ({})", updated.status.as_str());

    Ok(see_other(&format!("/business/experiences/{id}/edit?notice=saved")))
}

#[post("/business/experiences/{experience_id}/delete")]
pub async fn delete_experience(
    req: HttpRequest,
    state: web::Data<AppState>,
    experience_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let user = require_business_user(&ctx)?;
    let (business, listing) = owned_listing(&state, &ctx, &user, experience_id.into_inner()).await?;

    if !state.db.delete_experience(&ctx.auth, listing.experience.id).await? {
        return Err(AppError::NotFound);
    }
    log::info!("Business {} deleted experience {}", business.id, listing.experience.id);
    Ok(see_other("/business?notice=deleted"))
}

// ============================================================================
// IMAGES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub filename: Option<String>,
}

fn extension_for(content_type: &str, filename: Option<&str>) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/avif" => "avif",
        _ => match filename.and_then(|f| f.rsplit_once('.')).map(|(_, ext)| ext.to_ascii_lowercase()) {
            Some(ext) if ext == "png" => "png",
            Some(ext) if ext == "webp" => "webp",
            Some(ext) if ext == "gif" => "gif",
            _ => "jpg",
        },
    }
}

/// Raw image body from the dashboard's file picker. The first image on an
/// experience becomes its primary image.
#[post("/business/experiences/{experience_id}/images")]
pub async fn upload_image(
    req: HttpRequest,
    state: web::Data<AppState>,
    experience_id: web::Path<Uuid>,
    params: web::Query<UploadParams>,
    body: web::Bytes,
) -> HttpResponse {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let user = match require_business_user(&ctx) {
        Ok(user) => user,
        Err(_) => {
            return HttpResponse::Unauthorized()
                .json(ApiResponse::<()>::error("Sign in with a business account".into()))
        }
    };

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .unwrap_or_default();
    if !content_type.starts_with("image/") {
        return HttpResponse::UnsupportedMediaType()
            .json(ApiResponse::<()>::error("Only image uploads are accepted".into()));
    }
    if body.is_empty() || body.len() > MAX_UPLOAD_BYTES {
        return HttpResponse::PayloadTooLarge()
            .json(ApiResponse::<()>::error("Images must be under 5 MB".into()));
    }

    let (business, listing) = match owned_listing(&state, &ctx, &user, experience_id.into_inner()).await {
        Ok(found) => found,
        Err(AppError::NotFound) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Experience not found".into()))
        }
        Err(err) => {
            log::error!("Failed to load experience for upload: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to upload image".into()));
        }
    };

    let experience_id = listing.experience.id;
    let image_id = Uuid::new_v4();
    let extension = extension_for(&content_type, params.filename.as_deref());
    let path = format!("{}/{experience_id}/{image_id}.{extension}", business.id);
    let bucket = state.config.storage_bucket.as_str();

    if let Err(err) = state
        .db
        .backend()
        .upload(&ctx.auth, bucket, &path, body.to_vec(), &content_type)
        .await
    {
        log::error!("Storage upload failed for {path}: {err:?}");
        return HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error("Failed to upload image".into()));
    }

    let image = ExperienceImage {
        id: image_id,
        experience_id,
        url: state.db.backend().public_url(bucket, &path),
        storage_path: Some(path),
        is_primary: listing.images.is_empty(),
        display_order: listing.images.iter().map(|i| i.display_order + 1).max().unwrap_or(0),
    };
    match state.db.add_image(&ctx.auth, image).await {
        Ok(image) => HttpResponse::Created().json(ApiResponse::success(image)),
        Err(err) => {
            log::error!("Failed to attach image to {experience_id}: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to upload image".into()))
        }
    }
}

#[post("/business/experiences/{experience_id}/images/{image_id}/primary")]
pub async fn set_primary_image(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let user = require_business_user(&ctx)?;
    let (experience_id, image_id) = path.into_inner();
    let (_, listing) = owned_listing(&state, &ctx, &user, experience_id).await?;

    if !listing.images.iter().any(|i| i.id == image_id) {
        return Err(AppError::NotFound);
    }
    state
        .db
        .set_primary_image(&ctx.auth, experience_id, image_id)
        .await?;
    Ok(see_other(&format!(
        "/business/experiences/{experience_id}/edit?notice=primary"
    )))
}
