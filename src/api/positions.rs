/// Position reporting endpoints
use crate::{
    actor::Role,
    auth::AuthContext,
    context::AppContext,
    error::DispatchResult,
    matching::Coordinates,
    tracker::{PositionReport, ReportPositionRequest},
};
use axum::{
    extract::{Query, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Query parameters for the position listing
#[derive(Debug, Deserialize)]
pub struct PositionsParams {
    pub role: Option<String>,
}

/// Build position routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/positions", post(report_position).get(current_positions))
}

/// Report the caller's current position
async fn report_position(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ReportPositionRequest>,
) -> DispatchResult<Json<PositionReport>> {
    let report = ctx
        .tracker
        .report_position(&auth.actor, Coordinates::new(req.lat, req.lon))
        .await?;

    Ok(Json(report))
}

/// Latest position of every actor, keyed by actor id
async fn current_positions(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Query(params): Query<PositionsParams>,
) -> DispatchResult<Json<BTreeMap<String, PositionReport>>> {
    let role = params.role.as_deref().map(Role::from_str).transpose()?;

    Ok(Json(ctx.tracker.current_positions(role).await?))
}
