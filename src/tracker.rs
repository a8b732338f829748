/// Location tracking
///
/// Keeps the single latest position per actor. Every report overwrites the
/// previous one; no history and no staleness expiry.
use crate::{
    actor::{Actor, Role},
    error::{DispatchError, DispatchResult},
    lifecycle::{RequestManager, RequestState},
    matching::Coordinates,
    metrics,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::BTreeMap;

/// Latest known position of an actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionReport {
    pub actor_id: String,
    pub role: Role,
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
}

impl PositionReport {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Positions relevant to one transport request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPositions {
    pub request_id: String,
    pub state: RequestState,
    pub accepted: bool,
    /// Latest position of the assigned ambulance, if it has reported one
    pub ambulance: Option<PositionReport>,
    /// Origin location captured when the request was submitted
    pub client: Option<Coordinates>,
}

/// Position report payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPositionRequest {
    pub lat: f64,
    pub lon: f64,
}

/// Owns every `PositionReport` record
#[derive(Clone)]
pub struct LocationTracker {
    db: SqlitePool,
    requests: RequestManager,
}

impl LocationTracker {
    pub fn new(db: SqlitePool, requests: RequestManager) -> Self {
        Self { db, requests }
    }

    /// Upsert the live position for an actor (last write wins)
    pub async fn report_position(
        &self,
        actor: &Actor,
        position: Coordinates,
    ) -> DispatchResult<PositionReport> {
        if !position.is_finite() {
            return Err(DispatchError::Validation(
                "Latitude and longitude must be finite numbers".to_string(),
            ));
        }

        let report = PositionReport {
            actor_id: actor.id.clone(),
            role: actor.role,
            latitude: position.latitude,
            longitude: position.longitude,
            captured_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO position_report (actor_id, role, latitude, longitude, captured_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(actor_id) DO UPDATE SET
                role = excluded.role,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                captured_at = excluded.captured_at",
        )
        .bind(&report.actor_id)
        .bind(report.role.as_str())
        .bind(report.latitude)
        .bind(report.longitude)
        .bind(report.captured_at)
        .execute(&self.db)
        .await?;

        metrics::record_position_report(report.role.as_str());
        tracing::debug!(
            "Position for {} ({}) now {}, {}",
            report.actor_id,
            report.role.as_str(),
            report.latitude,
            report.longitude
        );

        Ok(report)
    }

    /// Latest position of every actor, optionally filtered by role, keyed by actor id
    pub async fn current_positions(
        &self,
        role: Option<Role>,
    ) -> DispatchResult<BTreeMap<String, PositionReport>> {
        let rows = match role {
            Some(role) => {
                sqlx::query(
                    "SELECT actor_id, role, latitude, longitude, captured_at
                     FROM position_report WHERE role = ?1",
                )
                .bind(role.as_str())
                .fetch_all(&self.db)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT actor_id, role, latitude, longitude, captured_at FROM position_report",
                )
                .fetch_all(&self.db)
                .await?
            }
        };

        rows.iter()
            .map(|row| report_from_row(row).map(|report| (report.actor_id.clone(), report)))
            .collect()
    }

    /// Latest position of a single actor
    pub async fn position_of(&self, actor_id: &str) -> DispatchResult<Option<PositionReport>> {
        let row = sqlx::query(
            "SELECT actor_id, role, latitude, longitude, captured_at
             FROM position_report WHERE actor_id = ?1",
        )
        .bind(actor_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(report_from_row).transpose()
    }

    /// Ambulance and client positions for a request.
    ///
    /// Nothing is resolved while the request is still pending.
    pub async fn current_position_for(&self, request_id: &str) -> DispatchResult<RequestPositions> {
        let request = self.requests.get_request(request_id).await?;

        let assigned = match request.assigned_actor_id.as_deref() {
            Some(actor_id) if request.state != RequestState::Pending => actor_id,
            _ => {
                return Ok(RequestPositions {
                    request_id: request.id.clone(),
                    state: request.state,
                    accepted: false,
                    ambulance: None,
                    client: None,
                })
            }
        };

        let ambulance = self.position_of(assigned).await?;

        Ok(RequestPositions {
            request_id: request.id.clone(),
            state: request.state,
            accepted: true,
            ambulance,
            client: request.origin_location,
        })
    }
}

fn report_from_row(row: &SqliteRow) -> DispatchResult<PositionReport> {
    let role: String = row.try_get("role")?;

    Ok(PositionReport {
        actor_id: row.try_get("actor_id")?,
        role: Role::from_str(&role)?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        captured_at: row.try_get("captured_at")?,
    })
}
