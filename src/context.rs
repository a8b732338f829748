/// Application context and dependency injection
use crate::{
    actor::ActorManager,
    config::ServerConfig,
    db,
    error::{DispatchError, DispatchResult},
    lifecycle::RequestManager,
    rate_limit::RateLimiter,
    tracker::LocationTracker,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub actor_manager: Arc<ActorManager>,
    pub request_manager: RequestManager,
    pub tracker: LocationTracker,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> DispatchResult<Self> {
        config.validate()?;

        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory)
                .await
                .map_err(|e| {
                    DispatchError::Internal(format!(
                        "Failed to create directory {:?}: {}",
                        config.storage.data_directory, e
                    ))
                })?;
        }

        let pool = db::create_pool(
            &config.storage.database,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..db::DatabaseOptions::default()
            },
        )
        .await?;

        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        Ok(Self::with_pool(config, pool))
    }

    /// Wire services around an already-migrated pool
    pub fn with_pool(config: ServerConfig, pool: SqlitePool) -> Self {
        let config = Arc::new(config);
        let request_manager = RequestManager::new(pool.clone());

        Self {
            actor_manager: Arc::new(ActorManager::new(pool.clone(), Arc::clone(&config))),
            tracker: LocationTracker::new(pool.clone(), request_manager.clone()),
            request_manager,
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            db: pool,
            config,
        }
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
