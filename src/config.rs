/// Configuration management for the dispatch service
use crate::{
    error::{DispatchError, DispatchResult},
    matching::DEFAULT_KM_PER_DEGREE,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Tracing filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "ambulance_dispatch=debug,tower_http=debug";

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
    pub dispatch: DispatchConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
    /// Directory of static assets served under `/static`, if any
    pub static_directory: Option<PathBuf>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    pub max_connections: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    pub session_ttl_secs: i64,
    /// Whether ambulance operators may register themselves
    pub allow_ambulance_signup: bool,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Dispatch presentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Factor turning a planar coordinate delta into approximate kilometers
    pub km_per_degree: f64,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> DispatchResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("DISPATCH_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("DISPATCH_PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| DispatchError::Validation("Invalid port number".to_string()))?;
        let version = env!("CARGO_PKG_VERSION").to_string();
        let static_directory = env::var("DISPATCH_STATIC_DIRECTORY").ok().map(PathBuf::from);

        let data_directory: PathBuf = env::var("DISPATCH_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("DISPATCH_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("ambulance_tracker.sqlite"));
        let max_connections = env::var("DISPATCH_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let jwt_secret = env::var("DISPATCH_JWT_SECRET")
            .map_err(|_| DispatchError::Validation("JWT secret required".to_string()))?;
        let session_ttl_secs = env::var("DISPATCH_SESSION_TTL_SECS")
            .unwrap_or_else(|_| "43200".to_string())
            .parse()
            .unwrap_or(43200);
        let allow_ambulance_signup = env::var("DISPATCH_ALLOW_AMBULANCE_SIGNUP")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let rate_limit_enabled = env::var("DISPATCH_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let requests_per_second = env::var("DISPATCH_RATE_LIMIT_PER_SECOND")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        let km_per_degree = match env::var("DISPATCH_KM_PER_DEGREE") {
            Ok(value) => value.parse().map_err(|_| {
                DispatchError::Validation("Invalid km per degree factor".to_string())
            })?,
            Err(_) => DEFAULT_KM_PER_DEGREE,
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
                static_directory,
            },
            storage: StorageConfig {
                data_directory,
                database,
                max_connections,
            },
            authentication: AuthConfig {
                jwt_secret,
                session_ttl_secs,
                allow_ambulance_signup,
            },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                requests_per_second,
            },
            logging: LoggingConfig { level: log_level },
            dispatch: DispatchConfig { km_per_degree },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> DispatchResult<()> {
        if self.service.hostname.is_empty() {
            return Err(DispatchError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(DispatchError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.session_ttl_secs <= 0 {
            return Err(DispatchError::Validation(
                "Session lifetime must be positive".to_string(),
            ));
        }

        if !self.dispatch.km_per_degree.is_finite() || self.dispatch.km_per_degree <= 0.0 {
            return Err(DispatchError::Validation(
                "km per degree factor must be a positive number".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "localhost".to_string(),
            port: 5000,
            version: "test".to_string(),
            static_directory: None,
        },
        storage: StorageConfig {
            data_directory: PathBuf::from("./data"),
            database: PathBuf::from("./data/test.sqlite"),
            max_connections: 1,
        },
        authentication: AuthConfig {
            jwt_secret: "test-secret-that-is-at-least-32-characters".to_string(),
            session_ttl_secs: 3600,
            allow_ambulance_signup: true,
        },
        rate_limit: RateLimitConfig {
            enabled: false,
            requests_per_second: 50,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        dispatch: DispatchConfig {
            km_per_degree: DEFAULT_KM_PER_DEGREE,
        },
    }
}
