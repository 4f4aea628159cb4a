use actix_web::HttpRequest;
use uuid::Uuid;

use crate::backend::{Auth, AuthUser};
use crate::database::Database;
use crate::gate::{nav_for, resolve_identity, resolve_role, NavVariant};
use crate::models::Role;

pub const SESSION_COOKIE: &str = "ef_session";

/// Per-request view of who is asking. Built once per page load and passed
/// down to data access and rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContext {
    pub auth: Auth,
    pub user: Option<AuthUser>,
    pub role: Option<Role>,
    pub nav: NavVariant,
}

impl PageContext {
    pub fn guest() -> Self {
        Self {
            auth: Auth::Anonymous,
            user: None,
            role: None,
            nav: NavVariant::Guest,
        }
    }

    pub fn signed_in(user: AuthUser, access_token: String, role: Role) -> Self {
        Self {
            auth: Auth::Bearer(access_token),
            user: Some(user),
            role: Some(role),
            nav: nav_for(Some(role)),
        }
    }

    pub async fn resolve(req: &HttpRequest, db: &Database) -> Self {
        let token = req.cookie(SESSION_COOKIE).map(|c| c.value().to_string());
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Self::guest();
        };

        let Some(user) = resolve_identity(db.backend(), Some(&token)).await else {
            return Self::guest();
        };

        let auth = Auth::Bearer(token.clone());
        let role = resolve_role(db, &auth, user.id).await;
        Self::signed_in(user, token, role)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}
