/// Registration and session endpoints
use crate::{
    actor::{Actor, LoginRequest, RegisterAmbulanceRequest, RegisterClientRequest, SessionResponse},
    auth::AuthContext,
    context::AppContext,
    error::{DispatchError, DispatchResult},
};
use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use validator::Validate;

/// Build session routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/actors/ambulance", post(register_ambulance))
        .route("/api/actors/client", post(register_client))
        .route(
            "/api/session",
            post(login).get(current_actor).delete(logout),
        )
}

/// Ambulance operator self-registration
async fn register_ambulance(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterAmbulanceRequest>,
) -> DispatchResult<(StatusCode, Json<SessionResponse>)> {
    req.validate()
        .map_err(|e| DispatchError::Validation(e.to_string()))?;

    let actor = ctx
        .actor_manager
        .register_ambulance(&req.username, &req.password)
        .await?;
    let session = ctx.actor_manager.create_session(&actor).await?;

    Ok((StatusCode::CREATED, Json(SessionResponse::new(actor, session))))
}

/// Anonymous client registration
async fn register_client(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterClientRequest>,
) -> DispatchResult<(StatusCode, Json<SessionResponse>)> {
    req.validate()
        .map_err(|e| DispatchError::Validation(e.to_string()))?;

    let actor = ctx
        .actor_manager
        .register_client(req.display_name.as_deref())
        .await?;
    let session = ctx.actor_manager.create_session(&actor).await?;

    Ok((StatusCode::CREATED, Json(SessionResponse::new(actor, session))))
}

/// Login
async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> DispatchResult<Json<SessionResponse>> {
    let (actor, session) = ctx
        .actor_manager
        .login(&req.username, &req.password)
        .await?;

    tracing::info!("Actor {} logged in with session {}", actor.id, session.id);

    Ok(Json(SessionResponse::new(actor, session)))
}

/// Current actor
async fn current_actor(auth: AuthContext) -> Json<Actor> {
    Json(auth.actor)
}

/// Logout
async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> DispatchResult<StatusCode> {
    ctx.actor_manager.delete_session(&auth.session_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
