//! Identity and role resolution shared by every page, plus the route guards
//! built on top of it.

use uuid::Uuid;

use crate::backend::{Auth, AuthUser, Backend};
use crate::context::PageContext;
use crate::database::Database;
use crate::errors::AppError;
use crate::models::Role;

/// Navigation bar shown to the visitor. Exactly one is rendered per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavVariant {
    Guest,
    User,
    Business,
}

/// Admins share the business navigation; the admin link is added on top.
pub fn nav_for(role: Option<Role>) -> NavVariant {
    match role {
        None => NavVariant::Guest,
        Some(Role::User) => NavVariant::User,
        Some(Role::Business) | Some(Role::Admin) => NavVariant::Business,
    }
}

/// Where a visitor lands when sent away from a page their role cannot use.
pub fn landing_for(role: Option<Role>) -> &'static str {
    match role {
        None => "/login",
        Some(Role::User) => "/",
        Some(Role::Business) => "/business",
        Some(Role::Admin) => "/admin",
    }
}

/// Resolves the session token to a user. Any platform failure is treated as
/// "not signed in" so the page still renders.
pub async fn resolve_identity(backend: &dyn Backend, access_token: Option<&str>) -> Option<AuthUser> {
    let token = access_token?;
    match backend.current_user(token).await {
        Ok(user) => user,
        Err(err) => {
            log::warn!("Session lookup failed, continuing as guest: {err}");
            None
        }
    }
}

/// Role from the profile row, falling back to [`Role::User`] when the row is
/// missing or the lookup fails.
pub async fn resolve_role(db: &Database, auth: &Auth, user_id: Uuid) -> Role {
    match db.role_for_user(auth, user_id).await {
        Ok(Some(role)) => role,
        Ok(None) => Role::User,
        Err(err) => {
            log::warn!("Role lookup failed for {user_id}, using baseline role: {err}");
            Role::User
        }
    }
}

pub fn require_user(ctx: &PageContext) -> Result<&AuthUser, AppError> {
    ctx.user.as_ref().ok_or(AppError::Unauthenticated)
}

/// Signed-in user whose role is one of `allowed`; anyone else is sent to
/// their own landing page.
pub fn require_role<'a>(ctx: &'a PageContext, allowed: &[Role]) -> Result<&'a AuthUser, AppError> {
    let user = require_user(ctx)?;
    match ctx.role {
        Some(role) if allowed.contains(&role) => Ok(user),
        role => Err(AppError::Forbidden {
            landing: landing_for(role),
        }),
    }
}
