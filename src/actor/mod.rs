/// Actor registry
///
/// Handles registration of clients and ambulance operators, password login,
/// and the bearer sessions the HTTP layer resolves into an explicit `Actor`.

mod manager;

pub use manager::ActorManager;

use crate::error::{DispatchError, DispatchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Role an actor plays in the dispatch flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Ambulance,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Ambulance => "ambulance",
        }
    }

    pub fn from_str(s: &str) -> DispatchResult<Self> {
        match s.to_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "ambulance" => Ok(Role::Ambulance),
            _ => Err(DispatchError::Validation(format!("Invalid role: {}", s))),
        }
    }
}

/// Authenticated participant: a requesting client or an ambulance operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Issued session
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Session resolved from a bearer token
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub actor: Actor,
    pub session_id: String,
}

/// Ambulance operator self-registration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterAmbulanceRequest {
    #[validate(length(min = 3, max = 150))]
    pub username: String,
    #[validate(length(min = 8, max = 256))]
    pub password: String,
}

/// Anonymous client registration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterClientRequest {
    #[validate(length(max = 150))]
    pub display_name: Option<String>,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Session response returned by registration and login
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub actor: Actor,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl SessionResponse {
    pub fn new(actor: Actor, session: Session) -> Self {
        Self {
            actor,
            access_token: session.access_token,
            expires_at: session.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from_str("client").unwrap(), Role::Client);
        assert_eq!(Role::from_str("AMBULANCE").unwrap(), Role::Ambulance);
        assert!(Role::from_str("driver").is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Ambulance).unwrap();
        assert_eq!(json, "\"ambulance\"");
    }

    #[test]
    fn test_register_ambulance_request_validation() {
        let ok = RegisterAmbulanceRequest {
            username: "amb1".to_string(),
            password: "correct-horse".to_string(),
        };
        assert!(ok.validate().is_ok());

        let short = RegisterAmbulanceRequest {
            username: "a".to_string(),
            password: "pw".to_string(),
        };
        let errors = short.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("username"));
        assert!(errors.field_errors().contains_key("password"));
    }
}
