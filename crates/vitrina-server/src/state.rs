//! Application state

use sqlx::SqlitePool;

use crate::audit::AuditRecorder;
use crate::catalog::CatalogStore;
use crate::client_ip::TrustedNetworkSet;
use crate::config::Config;
use crate::metrics::IngestionCounters;
use crate::rate_limit::RateLimiter;
use crate::write_keys::WriteKeyRegistry;

pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub rate_limiter: RateLimiter,
    pub write_keys: WriteKeyRegistry,
    pub trusted_proxies: TrustedNetworkSet,
    pub counters: IngestionCounters,
    pub catalog: CatalogStore,
    pub audit: AuditRecorder,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Config) -> Self {
        let write_keys = WriteKeyRegistry::from_config(
            &config.events_write_keys,
            config.events_write_key.as_deref(),
            config.events_require_key,
        );
        let trusted_proxies = TrustedNetworkSet::parse(&config.trusted_proxy_cidrs);
        Self {
            catalog: CatalogStore::new(db.clone()),
            audit: AuditRecorder::new(db.clone()),
            db,
            config,
            rate_limiter: RateLimiter::new(),
            write_keys,
            trusted_proxies,
            counters: IngestionCounters::new(),
        }
    }
}
