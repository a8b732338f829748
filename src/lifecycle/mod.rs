/// Transport request lifecycle
///
/// A request moves `Pending -> Accepted -> Finished` and never backwards.
/// The accepting ambulance is recorded exactly when the request leaves
/// `Pending`.

mod manager;

pub use manager::RequestManager;

use crate::{
    error::{DispatchError, DispatchResult},
    matching::Coordinates,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Lifecycle state of a transport request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Pending,
    Accepted,
    Finished,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Accepted => "accepted",
            RequestState::Finished => "finished",
        }
    }

    pub fn from_str(s: &str) -> DispatchResult<Self> {
        match s {
            "pending" => Ok(RequestState::Pending),
            "accepted" => Ok(RequestState::Accepted),
            "finished" => Ok(RequestState::Finished),
            _ => Err(DispatchError::Internal(format!(
                "Unknown request state in store: {}",
                s
            ))),
        }
    }
}

/// Emergency transport request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportRequest {
    pub id: String,
    pub address: String,
    pub condition: String,
    pub origin_location: Option<Coordinates>,
    /// Client actor that submitted the request, when it was authenticated
    pub requester_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub state: RequestState,
    pub assigned_actor_id: Option<String>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Submission payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitRequest {
    #[validate(length(max = 500))]
    pub address: String,
    #[validate(length(max = 1000))]
    pub condition: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl SubmitRequest {
    /// Origin location, present only when both components were sent
    pub fn origin(&self) -> DispatchResult<Option<Coordinates>> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Ok(Some(Coordinates::new(lat, lon))),
            (None, None) => Ok(None),
            _ => Err(DispatchError::Validation(
                "lat and lon must be provided together".to_string(),
            )),
        }
    }
}

/// Submission response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub request_id: String,
    pub request: TransportRequest,
}
