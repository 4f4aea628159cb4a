use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use super::{html, notice, see_other};
use crate::context::PageContext;
use crate::errors::AppError;
use crate::filters::{FilterParams, FilterSelection};
use crate::gate::require_role;
use crate::models::{ExperienceStatus, Role};
use crate::render::{pages, ResultsState};
use crate::search::{self, SearchOptions, Visibility};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AdminParams {
    #[serde(flatten)]
    pub filters: FilterParams,
    pub status: Option<String>,
    pub notice: Option<String>,
}

/// No `status` parameter means the review queue; an empty one means every
/// status.
fn status_filter(raw: Option<&str>) -> Option<ExperienceStatus> {
    match raw.map(str::trim) {
        None => Some(ExperienceStatus::Pending),
        Some("") | Some("all") => None,
        Some(value) => match value.parse::<ExperienceStatus>() {
            Ok(status) => Some(status),
            Err(err) => {
                log::debug!("Ignoring status filter: {err}");
                None
            }
        },
    }
}

#[get("/admin")]
pub async fn dashboard(
    req: HttpRequest,
    state: web::Data<AppState>,
    params: web::Query<AdminParams>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    require_role(&ctx, &[Role::Admin])?;

    let selection = FilterSelection::from_params(&params.filters);
    let status = status_filter(params.status.as_deref());
    let options = SearchOptions {
        visibility: Visibility::Privileged(status),
        limit: state.config.result_limit,
    };

    let (counts, outcome) = futures_util::join!(
        state.db.status_counts(&ctx.auth),
        search::search(&state.db, &ctx.auth, &selection, options),
    );
    let counts = counts
        .map_err(|err| log::error!("Failed to load status counts: {err:?}"))
        .ok();

    let flash = notice(params.notice.as_deref());
    Ok(html(pages::admin_dashboard(
        &ctx,
        counts.as_ref(),
        &selection,
        status,
        ResultsState::from(&outcome),
        flash.as_ref(),
    )))
}

async fn review(
    req: HttpRequest,
    state: web::Data<AppState>,
    experience_id: Uuid,
    status: ExperienceStatus,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let admin = require_role(&ctx, &[Role::Admin])?;

    state
        .db
        .set_experience_status(&ctx.auth, experience_id, status)
        .await?
        .ok_or(AppError::NotFound)?;
    log::info!("Admin {} set experience {experience_id} to {}", admin.id, status.as_str());
    Ok(see_other(&format!("/admin?notice={}", status.as_str())))
}

#[post("/admin/experiences/{experience_id}/approve")]
pub async fn approve_experience(
    req: HttpRequest,
    state: web::Data<AppState>,
    experience_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    review(req, state, experience_id.into_inner(), ExperienceStatus::Approved).await
}

#[post("/admin/experiences/{experience_id}/reject")]
pub async fn reject_experience(
    req: HttpRequest,
    state: web::Data<AppState>,
    experience_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    review(req, state, experience_id.into_inner(), ExperienceStatus::Rejected).await
}

#[post("/admin/experiences/{experience_id}/delete")]
pub async fn delete_experience(
    req: HttpRequest,
    state: web::Data<AppState>,
    experience_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let ctx = PageContext::resolve(&req, &state.db).await;
    let admin = require_role(&ctx, &[Role::Admin])?;
    let experience_id = experience_id.into_inner();

    if !state.db.delete_experience(&ctx.auth, experience_id).await? {
        return Err(AppError::NotFound);
    }
    log::info!("Admin {} deleted experience {experience_id}", admin.id);
    Ok(see_other("/admin?notice=deleted"))
}
