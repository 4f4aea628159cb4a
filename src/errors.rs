use actix_web::{http::header, http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::backend::BackendError;
use crate::context::PageContext;
use crate::render;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("sign-in required")]
    Unauthenticated,

    #[error("role not permitted, redirecting to {landing}")]
    Forbidden { landing: &'static str },

    #[error("platform error: {0}")]
    Backend(#[from] BackendError),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("submission already in progress")]
    DuplicateSubmission,
}

impl AppError {
    /// Static text shown to visitors; diagnostics stay in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "Please sign in to continue.",
            AppError::Forbidden { .. } => "You do not have access to that page.",
            AppError::Backend(_) => "Something went wrong. Please try again shortly.",
            AppError::Validation(_) => "Please check the form and try again.",
            AppError::NotFound => "We couldn't find that page.",
            AppError::DuplicateSubmission => "That form is already being submitted.",
        }
    }
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated | AppError::Forbidden { .. } => StatusCode::SEE_OTHER,
            AppError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::DuplicateSubmission => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Unauthenticated => redirect("/login"),
            AppError::Forbidden { landing } => redirect(landing),
            other => {
                if let AppError::Backend(err) = other {
                    log::error!("Request failed on platform call: {err:?}");
                }
                HttpResponse::build(self.status_code())
                    .content_type("text/html; charset=utf-8")
                    .body(render::pages::error_page(&PageContext::guest(), self.user_message()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_redirect() {
        let response = AppError::Unauthenticated.error_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/login");

        let response = AppError::Forbidden { landing: "/business" }.error_response();
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/business");
    }

    #[test]
    fn platform_errors_show_static_message() {
        let err = AppError::Backend(BackendError::Status {
            status: 500,
            message: "relation \"experiences\" does not exist".into(),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.user_message(), "Something went wrong. Please try again shortly.");
        assert!(!err.user_message().contains("relation"));
    }
}
