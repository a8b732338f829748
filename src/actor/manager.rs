/// Actor manager implementation using runtime queries
use crate::{
    actor::{Actor, Role, Session, ValidatedSession},
    config::ServerConfig,
    error::{DispatchError, DispatchResult},
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Access token claims
#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String,
    sid: String,
    role: Role,
    iat: i64,
    exp: i64,
}

/// Actor manager service
pub struct ActorManager {
    db: SqlitePool,
    config: Arc<ServerConfig>,
}

impl ActorManager {
    /// Create a new actor manager
    pub fn new(db: SqlitePool, config: Arc<ServerConfig>) -> Self {
        Self { db, config }
    }

    /// Register an ambulance operator with a password credential
    pub async fn register_ambulance(&self, username: &str, password: &str) -> DispatchResult<Actor> {
        if !self.config.authentication.allow_ambulance_signup {
            return Err(DispatchError::Authorization(
                "Ambulance registration is disabled".to_string(),
            ));
        }

        self.validate_username(username)?;
        if password.len() < 8 {
            return Err(DispatchError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        let credential_hash = hash_password(password)?;

        let actor = Actor {
            id: Uuid::new_v4().to_string(),
            display_name: username.to_string(),
            role: Role::Ambulance,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO actor (id, display_name, role, username, credential_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&actor.id)
        .bind(&actor.display_name)
        .bind(actor.role.as_str())
        .bind(username)
        .bind(&credential_hash)
        .bind(actor.created_at)
        .execute(&self.db)
        .await
        .map_err(|e| {
            // The UNIQUE index on username decides between concurrent signups
            if e.as_database_error().is_some_and(|db_err| db_err.is_unique_violation()) {
                DispatchError::Conflict(format!("Username {} already taken", username))
            } else {
                DispatchError::from(e)
            }
        })?;

        tracing::info!("Registered ambulance operator {} ({})", username, actor.id);

        Ok(actor)
    }

    /// Register an anonymous client. Clients carry no credential.
    pub async fn register_client(&self, display_name: Option<&str>) -> DispatchResult<Actor> {
        let display_name = display_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("client");

        let actor = Actor {
            id: Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            role: Role::Client,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO actor (id, display_name, role, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&actor.id)
        .bind(&actor.display_name)
        .bind(actor.role.as_str())
        .bind(actor.created_at)
        .execute(&self.db)
        .await?;

        tracing::debug!("Registered client {}", actor.id);

        Ok(actor)
    }

    /// Authenticate an operator and create a session
    pub async fn login(&self, username: &str, password: &str) -> DispatchResult<(Actor, Session)> {
        let row = sqlx::query(
            "SELECT id, display_name, role, credential_hash, created_at
             FROM actor WHERE username = ?1",
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| DispatchError::Authentication("Invalid credentials".to_string()))?;

        let credential_hash: Option<String> = row.get("credential_hash");
        let credential_hash = credential_hash
            .ok_or_else(|| DispatchError::Authentication("Invalid credentials".to_string()))?;

        if !verify_password(password, &credential_hash)? {
            tracing::warn!("Failed login attempt for {}", username);
            return Err(DispatchError::Authentication("Invalid credentials".to_string()));
        }

        let actor = actor_from_row(&row)?;
        let session = self.create_session(&actor).await?;

        Ok((actor, session))
    }

    /// Create a session for an actor
    pub async fn create_session(&self, actor: &Actor) -> DispatchResult<Session> {
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(self.config.authentication.session_ttl_secs);

        let claims = AccessClaims {
            sub: actor.id.clone(),
            sid: session_id.clone(),
            role: actor.role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
        )
        .map_err(|e| DispatchError::Jwt(e.to_string()))?;

        sqlx::query(
            "INSERT INTO session (id, actor_id, token_digest, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&session_id)
        .bind(&actor.id)
        .bind(token_digest(&access_token))
        .bind(now)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(Session {
            id: session_id,
            access_token,
            expires_at,
        })
    }

    /// Validate access token and return the session's actor
    pub async fn validate_access_token(&self, token: &str) -> DispatchResult<ValidatedSession> {
        let decoding_key =
            DecodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes());
        let claims = decode::<AccessClaims>(token, &decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    DispatchError::Authentication("Session expired".to_string())
                }
                _ => DispatchError::Authentication("Invalid or expired session".to_string()),
            })?
            .claims;

        // Revoked sessions have no row even though the token still verifies
        let row = sqlx::query(
            "SELECT s.id AS session_id, s.expires_at AS expires_at, a.id AS id,
                    a.display_name AS display_name, a.role AS role, a.created_at AS created_at
             FROM session s JOIN actor a ON a.id = s.actor_id
             WHERE s.id = ?1 AND s.token_digest = ?2",
        )
        .bind(&claims.sid)
        .bind(token_digest(token))
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| DispatchError::Authentication("Invalid or expired session".to_string()))?;

        let expires_at: chrono::DateTime<Utc> = row.get("expires_at");
        if Utc::now() > expires_at {
            return Err(DispatchError::Authentication("Session expired".to_string()));
        }

        let actor = actor_from_row(&row)?;
        if actor.id != claims.sub || actor.role != claims.role {
            return Err(DispatchError::Authentication(
                "Invalid or expired session".to_string(),
            ));
        }

        Ok(ValidatedSession {
            actor,
            session_id: row.get("session_id"),
        })
    }

    /// Delete a session (logout)
    pub async fn delete_session(&self, session_id: &str) -> DispatchResult<()> {
        sqlx::query("DELETE FROM session WHERE id = ?1")
            .bind(session_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Delete sessions past their expiry, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> DispatchResult<u64> {
        let result = sqlx::query("DELETE FROM session WHERE expires_at < ?1")
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    fn validate_username(&self, username: &str) -> DispatchResult<()> {
        if username.len() < 3 || username.len() > 150 {
            return Err(DispatchError::Validation(
                "Username must be between 3 and 150 characters".to_string(),
            ));
        }

        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
        {
            return Err(DispatchError::Validation(
                "Username may only contain letters, digits, '_', '.' and '-'".to_string(),
            ));
        }

        Ok(())
    }
}

fn actor_from_row(row: &SqliteRow) -> DispatchResult<Actor> {
    let role: String = row.try_get("role")?;

    Ok(Actor {
        id: row.try_get("id")?,
        display_name: row.try_get("display_name")?,
        role: Role::from_str(&role)?,
        created_at: row.try_get("created_at")?,
    })
}

fn hash_password(password: &str) -> DispatchResult<String> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    password_hasher()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DispatchError::Internal(format!("Password hashing failed: {}", e)))
}

#[cfg(not(test))]
fn password_hasher() -> Argon2<'static> {
    Argon2::default()
}

/// Cheap parameters so tests don't spend seconds per registration
#[cfg(test)]
fn password_hasher() -> Argon2<'static> {
    let params = argon2::Params::new(1024, 1, 1, None).expect("valid argon2 test params");
    Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params)
}

fn verify_password(password: &str, credential_hash: &str) -> DispatchResult<bool> {
    let parsed = PasswordHash::new(credential_hash)
        .map_err(|e| DispatchError::Internal(format!("Stored credential is malformed: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Hex SHA-256 digest stored in place of the raw token
fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
