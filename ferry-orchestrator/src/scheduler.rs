//! Periodic reconciliation
//!
//! Queues a reconcile deployment for every `auto_reconcile` stack that has no
//! queued or running deployment, once per interval.

use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::service::deployment_service;

pub fn spawn_reconcile_loop(pool: PgPool, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!("Periodic reconciliation every {:?}", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match deployment_service::enqueue_periodic_reconciliations(&pool).await {
                Ok(0) => tracing::debug!("No stacks due for reconciliation"),
                Ok(count) => tracing::info!("Queued {} periodic reconciliations", count),
                Err(err) => tracing::error!("Periodic reconciliation failed: {:?}", err),
            }
        }
    })
}
