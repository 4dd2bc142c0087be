use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::converter::RateTable;

/// Consider cached rates stale after 1 hour.
const CACHE_STALE_MINUTES: i64 = 60;

const RATES_CACHE: &str = "rates";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    /// Short relative age such as "5m ago", "3h ago" or "2d ago"
    pub fn age_display(&self) -> String {
        match self.age_minutes() {
            // Clock skew shows as "just now" too
            m if m < 1 => "just now".to_string(),
            m if m < 60 => format!("{}m ago", m),
            m if m < 1440 => format!("{}h ago", (m + 30) / 60),
            m => format!("{}d ago", (m + 720) / 1440),
        }
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", name))?;

        debug!(name, age = %cached.age_display(), "Loaded cache entry");
        Ok(Some(cached))
    }

    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let contents = serde_json::to_string_pretty(&cached)?;
        std::fs::write(self.cache_path(name), contents)
            .with_context(|| format!("Failed to write cache file: {}", name))?;
        Ok(())
    }

    /// Cached rates, with unusable entries dropped so gaps can be filled
    pub fn load_rates(&self) -> Result<Option<CachedData<RateTable>>> {
        let cached = self.load::<RateTable>(RATES_CACHE)?;
        Ok(cached.map(|entry| CachedData {
            data: entry.data.retain_usable(),
            cached_at: entry.cached_at,
        }))
    }

    pub fn save_rates(&self, rates: &RateTable) -> Result<()> {
        self.save(RATES_CACHE, rates)
    }

    pub fn clear(&self) -> Result<()> {
        let path = self.cache_path(RATES_CACHE);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CurrencyCode;
    use chrono::Duration;

    #[test]
    fn test_cached_data_age_display() {
        let mut cached = CachedData::new(());
        assert_eq!(cached.age_display(), "just now");

        cached.cached_at = Utc::now() - Duration::minutes(5);
        assert_eq!(cached.age_display(), "5m ago");

        cached.cached_at = Utc::now() - Duration::minutes(95);
        assert_eq!(cached.age_display(), "2h ago");

        cached.cached_at = Utc::now() - Duration::hours(30);
        assert_eq!(cached.age_display(), "1d ago");

        cached.cached_at = Utc::now() + Duration::minutes(10);
        assert_eq!(cached.age_display(), "just now");
    }

    #[test]
    fn test_cached_data_is_stale() {
        let fresh = CachedData::new(vec![1]);
        assert!(!fresh.is_stale());

        let mut old = CachedData::new(vec![1]);
        old.cached_at = Utc::now() - Duration::minutes(61);
        assert!(old.is_stale());
    }

    #[test]
    fn test_rates_round_trip_through_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = CacheManager::new(dir.path().join("cache")).expect("cache dir");
        assert!(cache.load_rates().expect("empty cache").is_none());

        cache.save_rates(&RateTable::demo()).expect("save");
        let cached = cache.load_rates().expect("load").expect("present");
        assert_eq!(cached.data.get(CurrencyCode::Ves), Some(36.5));
        assert!(!cached.is_stale());

        cache.clear().expect("clear");
        assert!(cache.load_rates().expect("load").is_none());
    }

    #[test]
    fn test_damaged_rates_file_falls_back_to_demo_rates() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cache = CacheManager::new(dir.path().to_path_buf()).expect("cache dir");
        std::fs::write(
            dir.path().join("rates.json"),
            r#"{"data":{"rates":{"USD":0.0,"EUR":0.9}},"cached_at":"2026-01-01T00:00:00Z"}"#,
        )
        .expect("write");

        let cached = cache.load_rates().expect("load").expect("present");
        assert_eq!(cached.data.get(CurrencyCode::Usd), None);

        let rates = cached.data.with_fallback();
        let conversion = rates
            .convert(10.0, CurrencyCode::Usd, CurrencyCode::Eur)
            .expect("usd filled from demo rates");
        assert!((conversion.result - 9.0).abs() < 1e-9);
    }
}
