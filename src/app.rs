use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::admins::{AdminRegistry, AdminStore, JsonBinStore};
use crate::config::Config;
use crate::gateway::MessageGateway;
use crate::routes::RouteCache;
use crate::router::Router;

/// Everything the handlers share. Built once in `main` and passed around in
/// an `Arc`.
pub struct AppContext {
    pub config: Config,
    pub router: Router,
    pub routes: Arc<RouteCache>,
}

impl AppContext {
    pub fn new(config: Config, gateway: Arc<dyn MessageGateway>, bot_name: &str) -> Result<Self> {
        let store: Option<Arc<dyn AdminStore>> = match &config.store {
            Some(store_config) => {
                info!("Admin persistence enabled (bin {})", store_config.bin_id);
                Some(Arc::new(JsonBinStore::new(
                    store_config.clone(),
                    config.request_timeout,
                )?))
            }
            None => {
                info!("Admin persistence disabled; only the owner receives messages");
                None
            }
        };

        let admins = AdminRegistry::new(config.owner_id, store);
        let routes = Arc::new(RouteCache::new(config.routes.ttl, config.routes.capacity));
        let router = Router::new(admins, gateway, routes.clone(), bot_name);

        Ok(Self {
            config,
            router,
            routes,
        })
    }
}
