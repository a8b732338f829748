/// Periodic maintenance jobs
use crate::{
    context::AppContext,
    error::{DispatchError, DispatchResult},
    metrics,
};
use std::{future::Future, sync::Arc};
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

pub mod tasks;

const SESSION_CLEANUP_EVERY: Duration = Duration::from_secs(3600);
const HEALTH_CHECK_EVERY: Duration = Duration::from_secs(300);

/// Spawns the maintenance loops against a shared context
pub struct JobScheduler {
    context: Arc<AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        let ctx = Arc::clone(&self.context);
        tokio::spawn(run_periodic("session_cleanup", SESSION_CLEANUP_EVERY, move || {
            let ctx = Arc::clone(&ctx);
            async move {
                let removed = tasks::cleanup_expired_sessions(&ctx).await?;
                if removed > 0 {
                    info!("Removed {} expired sessions", removed);
                }
                Ok::<_, DispatchError>(())
            }
        }));

        let ctx = Arc::clone(&self.context);
        tokio::spawn(run_periodic("health_check", HEALTH_CHECK_EVERY, move || {
            let ctx = Arc::clone(&ctx);
            async move { tasks::health_check(&ctx).await }
        }));

        info!("Background jobs started");
    }
}

/// Run `job` on every tick of `every`, recording each outcome
async fn run_periodic<F, Fut>(name: &'static str, every: Duration, job: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = DispatchResult<()>>,
{
    let mut ticker = interval(every);

    loop {
        ticker.tick().await;
        debug!("Running job {}", name);

        match job().await {
            Ok(()) => metrics::record_background_job(name, "success"),
            Err(e) => {
                metrics::record_background_job(name, "failure");
                error!("Job {} failed: {}", name, e);
            }
        }
    }
}
