/// Authentication extractors
///
/// Handlers receive the calling `Actor` explicitly through these extractors;
/// nothing downstream looks up a global "current user".
use crate::{
    actor::{Actor, Role},
    context::AppContext,
    error::{DispatchError, DispatchResult},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

/// Authenticated context - extracts and validates the session from the request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub actor: Actor,
    pub session_id: String,
}

impl AuthContext {
    /// Reject actors that do not play `role`
    pub fn require_role(&self, role: Role) -> DispatchResult<()> {
        if self.actor.role != role {
            return Err(DispatchError::Authorization(format!(
                "Requires {} role",
                role.as_str()
            )));
        }
        Ok(())
    }
}

async fn bearer_token(parts: &mut Parts) -> Option<String> {
    parts
        .extract::<TypedHeader<Authorization<Bearer>>>()
        .await
        .ok()
        .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string())
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = DispatchError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .await
            .ok_or_else(|| DispatchError::Authentication("Missing authorization header".to_string()))?;

        let session = state.actor_manager.validate_access_token(&token).await?;

        Ok(AuthContext {
            actor: session.actor,
            session_id: session.session_id,
        })
    }
}

/// Optional authenticated context - does not fail if no auth provided
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = DispatchError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let auth = match bearer_token(parts).await {
            Some(token) => match state.actor_manager.validate_access_token(&token).await {
                Ok(session) => Some(AuthContext {
                    actor: session.actor,
                    session_id: session.session_id,
                }),
                Err(e) => {
                    tracing::debug!("Ignoring invalid bearer token: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(OptionalAuthContext { auth })
    }
}
