/// Request manager: persistence and state transitions for transport requests
use crate::{
    actor::{Actor, Role},
    error::{DispatchError, DispatchResult},
    lifecycle::{RequestState, TransportRequest},
    matching::Coordinates,
    metrics,
};
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

const REQUEST_COLUMNS: &str = "id, address, condition, origin_latitude, origin_longitude,
    requester_id, state, assigned_actor_id, created_at, accepted_at, finished_at";

/// Owns every `TransportRequest` record
#[derive(Clone)]
pub struct RequestManager {
    db: SqlitePool,
}

impl RequestManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a new pending request
    pub async fn submit_request(
        &self,
        address: &str,
        condition: &str,
        origin_location: Option<Coordinates>,
        requester: Option<&Actor>,
    ) -> DispatchResult<TransportRequest> {
        let address = address.trim();
        let condition = condition.trim();

        if address.is_empty() {
            return Err(DispatchError::Validation("Address is required".to_string()));
        }
        if condition.is_empty() {
            return Err(DispatchError::Validation("Condition is required".to_string()));
        }
        if let Some(origin) = origin_location {
            if !origin.is_finite() || !origin.in_range() {
                return Err(DispatchError::Validation(
                    "Origin location is not a valid coordinate pair".to_string(),
                ));
            }
        }

        let request = TransportRequest {
            id: Uuid::new_v4().to_string(),
            address: address.to_string(),
            condition: condition.to_string(),
            origin_location,
            requester_id: requester.map(|actor| actor.id.clone()),
            created_at: Utc::now(),
            state: RequestState::Pending,
            assigned_actor_id: None,
            accepted_at: None,
            finished_at: None,
        };

        sqlx::query(
            "INSERT INTO transport_request
                (id, address, condition, origin_latitude, origin_longitude, requester_id, state, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&request.id)
        .bind(&request.address)
        .bind(&request.condition)
        .bind(origin_location.map(|o| o.latitude))
        .bind(origin_location.map(|o| o.longitude))
        .bind(&request.requester_id)
        .bind(request.state.as_str())
        .bind(request.created_at)
        .execute(&self.db)
        .await?;

        metrics::record_dispatch_event("submitted");
        tracing::info!("Transport request {} submitted", request.id);

        Ok(request)
    }

    /// All requests that are not finished, most recent first
    pub async fn list_pending(&self) -> DispatchResult<Vec<TransportRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transport_request
             WHERE state != 'finished'
             ORDER BY created_at DESC, rowid DESC",
            REQUEST_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(request_from_row).collect()
    }

    /// Fetch one request
    pub async fn get_request(&self, request_id: &str) -> DispatchResult<TransportRequest> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transport_request WHERE id = ?1",
            REQUEST_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            DispatchError::NotFound(format!("Transport request {} not found", request_id))
        })?;

        request_from_row(&row)
    }

    /// Assign a pending request to an ambulance.
    ///
    /// The transition is a single conditional update, so of several
    /// concurrent callers exactly one wins. A store-level conflict is
    /// retried once before the precondition is evaluated again.
    pub async fn accept_request(
        &self,
        request_id: &str,
        actor: &Actor,
    ) -> DispatchResult<TransportRequest> {
        let mut retried = false;
        loop {
            match self.try_accept(request_id, actor).await {
                Err(e) if e.is_transaction_conflict() && !retried => {
                    tracing::debug!("Conflict accepting {}, retrying once: {}", request_id, e);
                    retried = true;
                }
                Err(e) => {
                    metrics::record_dispatch_event("rejected");
                    return Err(e);
                }
                Ok(request) => return Ok(request),
            }
        }
    }

    async fn try_accept(
        &self,
        request_id: &str,
        actor: &Actor,
    ) -> DispatchResult<TransportRequest> {
        let current = self.get_request(request_id).await?;

        if current.state != RequestState::Pending {
            tracing::warn!(
                "Actor {} tried to accept request {} in state {}",
                actor.id,
                request_id,
                current.state.as_str()
            );
            return Err(DispatchError::InvalidState(format!(
                "Request {} is {}, not pending",
                request_id,
                current.state.as_str()
            )));
        }

        if actor.role != Role::Ambulance {
            return Err(DispatchError::Authorization(
                "Only ambulance operators can accept requests".to_string(),
            ));
        }

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE transport_request
             SET state = 'accepted', assigned_actor_id = ?1, accepted_at = ?2
             WHERE id = ?3 AND state = 'pending'",
        )
        .bind(&actor.id)
        .bind(now)
        .bind(request_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            // Lost the race between our read and the conditional write
            let latest = self.get_request(request_id).await?;
            return Err(DispatchError::InvalidState(format!(
                "Request {} is {}, not pending",
                request_id,
                latest.state.as_str()
            )));
        }

        metrics::record_dispatch_event("accepted");
        tracing::info!("Transport request {} accepted by {}", request_id, actor.id);

        Ok(TransportRequest {
            state: RequestState::Accepted,
            assigned_actor_id: Some(actor.id.clone()),
            accepted_at: Some(now),
            ..current
        })
    }

    /// Close an accepted request. Only the assigned ambulance may finish it.
    pub async fn finish_request(
        &self,
        request_id: &str,
        actor: &Actor,
    ) -> DispatchResult<TransportRequest> {
        let mut retried = false;
        loop {
            match self.try_finish(request_id, actor).await {
                Err(e) if e.is_transaction_conflict() && !retried => {
                    tracing::debug!("Conflict finishing {}, retrying once: {}", request_id, e);
                    retried = true;
                }
                Err(e) => {
                    metrics::record_dispatch_event("rejected");
                    return Err(e);
                }
                Ok(request) => return Ok(request),
            }
        }
    }

    async fn try_finish(
        &self,
        request_id: &str,
        actor: &Actor,
    ) -> DispatchResult<TransportRequest> {
        let current = self.get_request(request_id).await?;
        check_finishable(&current, actor)?;

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE transport_request
             SET state = 'finished', finished_at = ?1
             WHERE id = ?2 AND state = 'accepted' AND assigned_actor_id = ?3",
        )
        .bind(now)
        .bind(request_id)
        .bind(&actor.id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            let latest = self.get_request(request_id).await?;
            check_finishable(&latest, actor)?;
            return Err(DispatchError::InvalidState(format!(
                "Request {} changed while finishing",
                request_id
            )));
        }

        metrics::record_dispatch_event("finished");
        tracing::info!("Transport request {} finished by {}", request_id, actor.id);

        Ok(TransportRequest {
            state: RequestState::Finished,
            finished_at: Some(now),
            ..current
        })
    }
}

fn check_finishable(request: &TransportRequest, actor: &Actor) -> DispatchResult<()> {
    if request.state != RequestState::Accepted {
        tracing::warn!(
            "Actor {} tried to finish request {} in state {}",
            actor.id,
            request.id,
            request.state.as_str()
        );
        return Err(DispatchError::InvalidState(format!(
            "Request {} is {}, not accepted",
            request.id,
            request.state.as_str()
        )));
    }

    if request.assigned_actor_id.as_deref() != Some(actor.id.as_str()) {
        return Err(DispatchError::Authorization(
            "Only the assigned ambulance can finish this request".to_string(),
        ));
    }

    Ok(())
}

fn request_from_row(row: &SqliteRow) -> DispatchResult<TransportRequest> {
    let latitude: Option<f64> = row.try_get("origin_latitude")?;
    let longitude: Option<f64> = row.try_get("origin_longitude")?;
    let state: String = row.try_get("state")?;

    Ok(TransportRequest {
        id: row.try_get("id")?,
        address: row.try_get("address")?,
        condition: row.try_get("condition")?,
        origin_location: latitude
            .zip(longitude)
            .map(|(lat, lon)| Coordinates::new(lat, lon)),
        requester_id: row.try_get("requester_id")?,
        created_at: row.try_get("created_at")?,
        state: RequestState::from_str(&state)?,
        assigned_actor_id: row.try_get("assigned_actor_id")?,
        accepted_at: row.try_get("accepted_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actor::ActorManager, config::test_config, db::memory_pool};
    use sqlx::{sqlite::SqliteConnectOptions, Connection, SqliteConnection};
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };
    use tempfile::tempdir;

    async fn setup() -> (RequestManager, ActorManager) {
        let pool = memory_pool().await;
        (
            RequestManager::new(pool.clone()),
            ActorManager::new(pool, Arc::new(test_config())),
        )
    }

    async fn ambulance(actors: &ActorManager, username: &str) -> Actor {
        actors
            .register_ambulance(username, "hunter22hunter")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_then_list_pending() {
        let (requests, _) = setup().await;

        let request = requests
            .submit_request("123 Main St", "chest pain", None, None)
            .await
            .unwrap();
        assert_eq!(request.state, RequestState::Pending);
        assert!(request.assigned_actor_id.is_none());

        let pending = requests.list_pending().await.unwrap();
        let matching: Vec<_> = pending.iter().filter(|r| r.id == request.id).collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].state, RequestState::Pending);
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_fields() {
        let (requests, _) = setup().await;

        let result = requests.submit_request("", "chest pain", None, None).await;
        assert!(matches!(result, Err(DispatchError::Validation(_))));

        let result = requests.submit_request("123 Main St", "   ", None, None).await;
        assert!(matches!(result, Err(DispatchError::Validation(_))));

        let origin = Some(Coordinates::new(f64::NAN, 120.0));
        let result = requests
            .submit_request("123 Main St", "chest pain", origin, None)
            .await;
        assert!(matches!(result, Err(DispatchError::Validation(_))));
    }

    #[tokio::test]
    async fn test_submit_rejects_out_of_range_origin() {
        let (requests, _) = setup().await;

        for origin in [Coordinates::new(91.0, 0.0), Coordinates::new(0.0, -180.5)] {
            let result = requests
                .submit_request("123 Main St", "chest pain", Some(origin), None)
                .await;
            assert!(matches!(result, Err(DispatchError::Validation(_))));
        }

        let edge = Coordinates::new(-90.0, 180.0);
        let request = requests
            .submit_request("123 Main St", "chest pain", Some(edge), None)
            .await
            .unwrap();
        assert_eq!(request.origin_location, Some(edge));
    }

    #[tokio::test]
    async fn test_list_pending_most_recent_first() {
        let (requests, _) = setup().await;

        let first = requests
            .submit_request("1 First St", "fracture", None, None)
            .await
            .unwrap();
        let second = requests
            .submit_request("2 Second St", "burn", Some(Coordinates::new(14.6, 120.98)), None)
            .await
            .unwrap();

        let pending = requests.list_pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, second.id);
        assert_eq!(pending[1].id, first.id);
        assert_eq!(pending[0].origin_location, Some(Coordinates::new(14.6, 120.98)));
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let (requests, actors) = setup().await;
        let amb1 = ambulance(&actors, "AMB1").await;

        let request = requests
            .submit_request("123 Main St", "chest pain", None, None)
            .await
            .unwrap();

        let accepted = requests.accept_request(&request.id, &amb1).await.unwrap();
        assert_eq!(accepted.state, RequestState::Accepted);
        assert_eq!(accepted.assigned_actor_id.as_deref(), Some(amb1.id.as_str()));

        // Accepted requests stay listed
        let pending = requests.list_pending().await.unwrap();
        assert!(pending.iter().any(|r| r.id == request.id));

        let finished = requests.finish_request(&request.id, &amb1).await.unwrap();
        assert_eq!(finished.state, RequestState::Finished);
        assert_eq!(finished.assigned_actor_id.as_deref(), Some(amb1.id.as_str()));

        let stored = requests.get_request(&request.id).await.unwrap();
        assert_eq!(stored.state, RequestState::Finished);
        assert!(stored.finished_at.is_some());

        let pending = requests.list_pending().await.unwrap();
        assert!(!pending.iter().any(|r| r.id == request.id));
    }

    #[tokio::test]
    async fn test_accept_twice_fails() {
        let (requests, actors) = setup().await;
        let amb1 = ambulance(&actors, "amb1").await;
        let amb2 = ambulance(&actors, "amb2").await;

        let request = requests
            .submit_request("123 Main St", "chest pain", None, None)
            .await
            .unwrap();
        requests.accept_request(&request.id, &amb1).await.unwrap();

        let result = requests.accept_request(&request.id, &amb2).await;
        assert!(matches!(result, Err(DispatchError::InvalidState(_))));

        let result = requests.accept_request(&request.id, &amb1).await;
        assert!(matches!(result, Err(DispatchError::InvalidState(_))));

        let stored = requests.get_request(&request.id).await.unwrap();
        assert_eq!(stored.assigned_actor_id.as_deref(), Some(amb1.id.as_str()));
    }

    #[tokio::test]
    async fn test_accept_requires_ambulance_role() {
        let (requests, actors) = setup().await;
        let client = actors.register_client(None).await.unwrap();

        let request = requests
            .submit_request("123 Main St", "chest pain", None, Some(&client))
            .await
            .unwrap();
        assert_eq!(request.requester_id.as_deref(), Some(client.id.as_str()));

        let result = requests.accept_request(&request.id, &client).await;
        assert!(matches!(result, Err(DispatchError::Authorization(_))));

        let stored = requests.get_request(&request.id).await.unwrap();
        assert_eq!(stored.state, RequestState::Pending);
    }

    #[tokio::test]
    async fn test_unknown_request() {
        let (requests, actors) = setup().await;
        let amb1 = ambulance(&actors, "amb1").await;

        let result = requests.accept_request("missing", &amb1).await;
        assert!(matches!(result, Err(DispatchError::NotFound(_))));

        let result = requests.finish_request("missing", &amb1).await;
        assert!(matches!(result, Err(DispatchError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_finish_invalid_states() {
        let (requests, actors) = setup().await;
        let amb1 = ambulance(&actors, "amb1").await;

        let request = requests
            .submit_request("123 Main St", "chest pain", None, None)
            .await
            .unwrap();

        let result = requests.finish_request(&request.id, &amb1).await;
        assert!(matches!(result, Err(DispatchError::InvalidState(_))));

        requests.accept_request(&request.id, &amb1).await.unwrap();
        requests.finish_request(&request.id, &amb1).await.unwrap();

        let result = requests.finish_request(&request.id, &amb1).await;
        assert!(matches!(result, Err(DispatchError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_finish_by_other_ambulance_fails() {
        let (requests, actors) = setup().await;
        let amb1 = ambulance(&actors, "amb1").await;
        let amb2 = ambulance(&actors, "amb2").await;

        let request = requests
            .submit_request("123 Main St", "chest pain", None, None)
            .await
            .unwrap();
        requests.accept_request(&request.id, &amb1).await.unwrap();

        let result = requests.finish_request(&request.id, &amb2).await;
        assert!(matches!(result, Err(DispatchError::Authorization(_))));

        let stored = requests.get_request(&request.id).await.unwrap();
        assert_eq!(stored.state, RequestState::Accepted);
    }

    #[tokio::test]
    async fn test_concurrent_accept_has_one_winner() {
        let dir = tempdir().unwrap();
        let pool = crate::db::create_pool(
            &dir.path().join("race.sqlite"),
            crate::db::DatabaseOptions::default(),
        )
        .await
        .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();

        let requests = RequestManager::new(pool.clone());
        let actors = ActorManager::new(pool, Arc::new(test_config()));
        let amb1 = ambulance(&actors, "amb1").await;
        let amb2 = ambulance(&actors, "amb2").await;

        let request = requests
            .submit_request("123 Main St", "chest pain", None, None)
            .await
            .unwrap();

        let first = {
            let requests = requests.clone();
            let id = request.id.clone();
            tokio::spawn(async move { requests.accept_request(&id, &amb1).await })
        };
        let second = {
            let requests = requests.clone();
            let id = request.id.clone();
            tokio::spawn(async move { requests.accept_request(&id, &amb2).await })
        };

        let results = vec![first.await.unwrap(), second.await.unwrap()];
        let winners = results.iter().filter(|r| r.is_ok()).count();
        let losers = results
            .iter()
            .filter(|r| matches!(r, Err(DispatchError::InvalidState(_))))
            .count();

        assert_eq!(winners, 1);
        assert_eq!(losers, 1);

        let stored = requests.get_request(&request.id).await.unwrap();
        assert_eq!(stored.state, RequestState::Accepted);
    }

    #[tokio::test]
    async fn test_accept_retries_once_when_store_is_busy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("busy.sqlite");
        let pool = crate::db::create_pool(
            &path,
            crate::db::DatabaseOptions {
                busy_timeout: Duration::from_millis(250),
                ..crate::db::DatabaseOptions::default()
            },
        )
        .await
        .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();

        let requests = RequestManager::new(pool.clone());
        let actors = ActorManager::new(pool, Arc::new(test_config()));
        let amb1 = ambulance(&actors, "amb1").await;
        let request = requests
            .submit_request("123 Main St", "chest pain", None, None)
            .await
            .unwrap();

        // A second connection takes the write lock for longer than one busy timeout
        let mut holder =
            SqliteConnection::connect_with(&SqliteConnectOptions::new().filename(&path))
                .await
                .unwrap();
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut holder)
            .await
            .unwrap();

        let started = Instant::now();
        let accept = {
            let requests = requests.clone();
            let id = request.id.clone();
            tokio::spawn(async move { requests.accept_request(&id, &amb1).await })
        };

        tokio::time::sleep(Duration::from_millis(350)).await;
        sqlx::query("ROLLBACK").execute(&mut holder).await.unwrap();

        let accepted = accept.await.unwrap().unwrap();
        assert_eq!(accepted.state, RequestState::Accepted);
        // The first attempt must have timed out on the lock
        assert!(started.elapsed() >= Duration::from_millis(250));

        let stored = requests.get_request(&request.id).await.unwrap();
        assert_eq!(stored.state, RequestState::Accepted);
    }
}
