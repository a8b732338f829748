/// Background task implementations
use crate::{context::AppContext, error::DispatchResult};

/// Cleanup expired sessions
pub async fn cleanup_expired_sessions(ctx: &AppContext) -> DispatchResult<u64> {
    ctx.actor_manager.cleanup_expired_sessions().await
}

/// Health check - verify the store is reachable
pub async fn health_check(ctx: &AppContext) -> DispatchResult<()> {
    crate::db::test_connection(&ctx.db).await
}
