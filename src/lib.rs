pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod tasks;
pub mod token;
pub mod validate;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};

use auth::CredentialHasher;
use clock::{Clock, SystemClock};
use config::Config;
use db::DbPool;
use error::AppError;
use token::TokenService;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub tokens: Arc<TokenService>,
    pub hasher: Arc<CredentialHasher>,
    pub clock: Arc<dyn Clock>,
    pub base_path: Arc<String>,
}

impl AppState {
    pub fn new(db: DbPool, config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            db,
            tokens: Arc::new(TokenService::new(&config.token_secret)),
            hasher: Arc::new(CredentialHasher::new(&config.hash_cost)?),
            clock: Arc::new(SystemClock),
            base_path: Arc::new(config.base_path.clone()),
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    let base_path = state.base_path.clone();

    let app_routes = Router::new()
        .route(
            "/tasks",
            get(handlers::tasks::list_tasks).post(handlers::tasks::create_task),
        )
        .route(
            "/tasks/{id}",
            get(handlers::tasks::get_task)
                .patch(handlers::tasks::update_task)
                .delete(handlers::tasks::delete_task),
        )
        .route("/users", post(handlers::users::signup))
        .route("/users/profile", get(handlers::users::profile))
        .route("/users/login", post(handlers::users::login))
        .route("/users/logout", delete(handlers::users::logout))
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::compression::CompressionLayer::new()),
        )
        .with_state(state);

    tracing::info!("base_path: {base_path:?}");

    if base_path.is_empty() {
        app_routes
    } else {
        Router::new().nest(&base_path, app_routes)
    }
}
