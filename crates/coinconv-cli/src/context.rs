//! Services shared by every command, built once at startup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use coinconv_core::auth::{KeyValueStore, MemoryStore, SharedStorage};
use coinconv_core::cache::{CacheManager, CachedData};
use coinconv_core::{ApiClient, AuthService, Config, RateTable, SessionController};
use tracing::{debug, warn};

/// Where a rate table came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateSource {
    Live,
    Cached(String),
    Demo,
}

impl std::fmt::Display for RateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateSource::Live => write!(f, "live rates"),
            RateSource::Cached(age) => write!(f, "cached rates, {}", age),
            RateSource::Demo => write!(f, "demo rates"),
        }
    }
}

pub struct AppContext {
    pub config: Config,
    pub storage: SharedStorage,
    pub session: SessionController,
    pub api: ApiClient,
    pub auth: AuthService,
    pub cache: Option<CacheManager>,
}

impl AppContext {
    pub fn build(api_url: Option<String>) -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };

        let durable: Arc<dyn KeyValueStore> = match config.durable_store() {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "Durable token storage unavailable, sign-in will not persist");
                Arc::new(MemoryStore::new())
            }
        };
        let storage = SharedStorage::new(durable);

        let session = SessionController::new(storage.open_context(&config.storage_key));
        session.initialize();
        debug!(authenticated = session.is_authenticated(), "Session restored");

        let base_url = api_url.unwrap_or_else(|| config.api_base_url());
        let api = ApiClient::with_timeout(
            &base_url,
            Duration::from_secs(config.request_timeout_secs),
            session.clone(),
        )?;
        let auth = AuthService::new(api.clone());

        let cache = match config.cache_dir().and_then(CacheManager::new) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(error = %e, "Rate cache disabled");
                None
            }
        };

        Ok(Self {
            config,
            storage,
            session,
            api,
            auth,
            cache,
        })
    }

    fn cached_rates(&self) -> Option<CachedData<RateTable>> {
        let cache = self.cache.as_ref()?;
        match cache.load_rates() {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable rate cache");
                None
            }
        }
    }

    /// Rates for a conversion: fresh cache, then the API, then stale cache,
    /// then the built-in demo table.
    pub async fn rates(&self, refresh: bool, offline: bool) -> (RateTable, RateSource) {
        let cached = self.cached_rates();

        if let Some(ref entry) = cached {
            if offline || (!refresh && !entry.is_stale()) {
                return (entry.data.clone().with_fallback(), RateSource::Cached(entry.age_display()));
            }
        }

        if !offline {
            match self.api.fetch_latest_rates().await {
                Ok(rates) => {
                    if let Some(cache) = &self.cache {
                        if let Err(e) = cache.save_rates(&rates) {
                            warn!(error = %e, "Failed to cache rates");
                        }
                    }
                    return (rates.with_fallback(), RateSource::Live);
                }
                Err(e) => warn!(error = %e, "Could not fetch live rates"),
            }
        }

        match cached {
            Some(entry) => {
                let age = entry.age_display();
                (entry.data.with_fallback(), RateSource::Cached(age))
            }
            None => (RateTable::demo(), RateSource::Demo),
        }
    }
}
