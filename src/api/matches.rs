/// Nearest-ambulance estimation endpoint
use crate::{
    actor::Role,
    auth::AuthContext,
    context::AppContext,
    error::DispatchResult,
    matching::{approx_km, estimate_nearest, NearestMatch},
    metrics,
};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

/// Match view with the display distance
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchView {
    #[serde(flatten)]
    pub nearest: NearestMatch,
    pub approx_km: f64,
}

/// Build match routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/matches", get(estimate))
}

/// Closest ambulance for every client that has reported a position
async fn estimate(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> DispatchResult<Json<Vec<MatchView>>> {
    auth.require_role(Role::Ambulance)?;

    // BTreeMap iteration gives a stable, id-ordered tie-break
    let clients: Vec<_> = ctx
        .tracker
        .current_positions(Some(Role::Client))
        .await?
        .into_iter()
        .map(|(id, report)| (id, report.coordinates()))
        .collect();
    let ambulances: Vec<_> = ctx
        .tracker
        .current_positions(Some(Role::Ambulance))
        .await?
        .into_iter()
        .map(|(id, report)| (id, report.coordinates()))
        .collect();

    let km_per_degree = ctx.config.dispatch.km_per_degree;
    let matches = estimate_nearest(&clients, &ambulances)
        .into_iter()
        .map(|nearest| {
            let km = approx_km(nearest.distance, km_per_degree);
            metrics::record_match_distance(km);
            MatchView {
                approx_km: km,
                nearest,
            }
        })
        .collect();

    Ok(Json(matches))
}
