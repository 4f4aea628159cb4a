use crate::config::AppConfig;
use crate::database::Database;
use crate::guard::SubmitGuard;

/// Shared by every worker through `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: AppConfig,
    pub guard: SubmitGuard,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Self {
        Self {
            db,
            config,
            guard: SubmitGuard::new(),
        }
    }
}
