/// Ambulance Dispatch - emergency transport coordination service
///
/// Clients submit transport requests, ambulances accept and finish them,
/// and both sides share live positions while a request is in flight.

mod actor;
mod api;
mod auth;
mod config;
mod context;
mod db;
mod error;
mod jobs;
mod lifecycle;
mod matching;
mod metrics;
mod rate_limit;
mod server;
mod tracker;

use config::ServerConfig;
use context::AppContext;
use error::DispatchResult;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> DispatchResult<()> {
    let config = ServerConfig::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.logging.level))
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    let ctx = Arc::new(AppContext::new(config).await?);

    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    _              _           _
   / \   _ __ ___ | |__  _   _| | __ _ _ __   ___ ___
  / _ \ | '_ ` _ \| '_ \| | | | |/ _` | '_ \ / __/ _ \
 / ___ \| | | | | | |_) | |_| | | (_| | | | | (_|  __/
/_/   \_\_| |_| |_|_.__/ \__,_|_|\__,_|_| |_|\___\___|

        Ambulance Dispatch v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
