//! Shared application state handed to every handler.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    db::DbPool,
    models::revenue::DataSource,
    services::{revenue_service::RevenueSource, zoho_client::ZohoClient},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    /// Present only when every Zoho setting is configured
    pub zoho: Option<Arc<ZohoClient>>,
}

impl AppState {
    pub fn new(config: Config, pool: DbPool, zoho: Option<ZohoClient>) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            zoho: zoho.map(Arc::new),
        }
    }

    /// Revenue records from `source` for the current request.
    pub fn revenue_source(&self, source: DataSource) -> RevenueSource<'_> {
        RevenueSource {
            pool: &self.pool,
            zoho: self.zoho.as_deref(),
            source,
        }
    }
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
