use std::sync::Arc;

use tracing::info;

use crate::routes::RouteCache;
use crate::scheduler::Scheduler;

/// Expired routes are dropped every ten minutes; lookups also check the TTL,
/// so this only bounds memory.
const ROUTE_EVICTION_CRON: &str = "0 */10 * * * *";
const HEARTBEAT_CRON: &str = "0 0 * * * *";

pub async fn register_builtin_tasks(
    scheduler: &Scheduler,
    routes: Arc<RouteCache>,
) -> anyhow::Result<()> {
    scheduler
        .add_cron_job(ROUTE_EVICTION_CRON, "route-eviction", move || {
            let routes = routes.clone();
            async move {
                let removed = routes.evict_expired().await;
                if removed > 0 {
                    info!("Route eviction: {} expired, {} kept", removed, routes.len().await);
                }
            }
        })
        .await?;

    scheduler
        .add_cron_job(HEARTBEAT_CRON, "heartbeat", || async {
            info!("Heartbeat: relay is alive");
        })
        .await?;

    Ok(())
}
