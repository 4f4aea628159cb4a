mod backend;
mod config;
mod context;
mod database;
mod errors;
mod favorites;
mod filters;
mod gate;
mod guard;
mod handlers;
mod local_store;
mod metrics;
mod models;
mod render;
mod search;
mod state;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use serde_json::json;
use uuid::Uuid;

use crate::backend::{Backend, MemoryBackend, RestBackend};
use crate::config::{AppConfig, BackendMode};
use crate::database::Database;
use crate::state::AppState;

/// Small catalogue so the memory mode has something to browse.
fn demo_backend() -> MemoryBackend {
    let backend = MemoryBackend::new();
    let owner = backend.register_user("demo-business@example.com", "demo-password");
    let business_id = Uuid::new_v4();
    backend.seed("profiles", vec![json!({ "id": owner.user.id, "role": "business" })]);
    backend.seed(
        "businesses",
        vec![json!({ "id": business_id, "user_id": owner.user.id, "name": "Wild Atlantic Tours" })],
    );

    let catalogue = [
        ("Cliff walk with a local guide", "Clare", Some(35.0), 1),
        ("Seafood cookery class", "Galway", Some(85.0), 6),
        ("Sea kayaking at sunset", "Kerry", Some(120.0), 5),
        ("Historic pub crawl", "Dublin", None, 8),
    ];
    for (title, county, price_min, category_id) in catalogue {
        let id = Uuid::new_v4();
        backend.seed(
            "experiences",
            vec![json!({
                "id": id,
                "business_id": business_id,
                "title": title,
                "long_description": format!("{title} in County {county}."),
                "county": county,
                "price_min": price_min,
                "status": "approved",
                "is_published": true,
                "booking_url": "https://example.com/book",
                "created_at": chrono::Utc::now(),
            })],
        );
        backend.seed(
            "experience_categories",
            vec![json!({ "experience_id": id, "category_id": category_id })],
        );
    }

    let admin = backend.register_user("demo-admin@example.com", "demo-password");
    backend.seed("profiles", vec![json!({ "id": admin.user.id, "role": "admin" })]);
    backend
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env()?;
    let bind_address = config.bind_address();

    let backend: Arc<dyn Backend> = match config.backend_mode {
        BackendMode::Rest => {
            let client = RestBackend::new(
                &config.backend_url,
                config.backend_anon_key.clone(),
                config.http_timeout,
            )
            .map_err(|err| {
                log::error!("Failed to initialize platform client: {err:?}");
                std::io::Error::new(std::io::ErrorKind::Other, err)
            })?;
            log::info!("Using platform at {}", config.backend_url);
            Arc::new(client)
        }
        BackendMode::Memory => {
            log::warn!("BACKEND_MODE=memory: data lives in this process only");
            log::info!("Demo accounts: demo-business@example.com, demo-admin@example.com (password: demo-password)");
            Arc::new(demo_backend())
        }
    };

    let state = web::Data::new(AppState::new(Database::new(backend), config));

    log::info!("🚀 Starting Experience Finder on {}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET"])
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)?
    .run()
    .await
}
