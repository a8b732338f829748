/// Transport request endpoints
use crate::{
    actor::Role,
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    error::{DispatchError, DispatchResult},
    lifecycle::{SubmitRequest, SubmitResponse, TransportRequest},
    tracker::RequestPositions,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

/// Build request routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/requests", post(submit_request).get(list_pending))
        .route("/api/requests/:id", get(get_request))
        .route("/api/requests/:id/accept", post(accept_request))
        .route("/api/requests/:id/finish", post(finish_request))
        .route("/api/requests/:id/positions", get(request_positions))
}

/// Submit a new emergency transport request
async fn submit_request(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Json(req): Json<SubmitRequest>,
) -> DispatchResult<(StatusCode, Json<SubmitResponse>)> {
    req.validate()
        .map_err(|e| DispatchError::Validation(e.to_string()))?;
    let origin = req.origin()?;

    let requester = auth.auth.as_ref().map(|a| &a.actor);
    let request = ctx
        .request_manager
        .submit_request(&req.address, &req.condition, origin, requester)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            request_id: request.id.clone(),
            request,
        }),
    ))
}

/// Requests that still need attention
async fn list_pending(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> DispatchResult<Json<Vec<TransportRequest>>> {
    auth.require_role(Role::Ambulance)?;

    Ok(Json(ctx.request_manager.list_pending().await?))
}

async fn get_request(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> DispatchResult<Json<TransportRequest>> {
    Ok(Json(ctx.request_manager.get_request(&id).await?))
}

async fn accept_request(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> DispatchResult<Json<TransportRequest>> {
    let request = ctx.request_manager.accept_request(&id, &auth.actor).await?;

    Ok(Json(request))
}

async fn finish_request(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> DispatchResult<Json<TransportRequest>> {
    let request = ctx.request_manager.finish_request(&id, &auth.actor).await?;

    Ok(Json(request))
}

/// Ambulance and client positions for a request, polled by the client
async fn request_positions(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> DispatchResult<Json<RequestPositions>> {
    Ok(Json(ctx.tracker.current_position_for(&id).await?))
}
