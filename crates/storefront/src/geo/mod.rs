//! Chilean regions and comunas for the address form.
//!
//! Lookups go through a cache and then an ordered list of tiers:
//!
//! 1. [`DpaClient`] - public DPA API (`apis.digital.gob.cl/dpa`)
//! 2. [`SnapshotSource`] - `regiones.json` / `comunas_by_region.json` on disk
//! 3. [`EmbeddedSource`] - constants compiled into the binary
//!
//! The first tier that answers wins and its answer is cached (7 days by
//! default). Lookups never fail: regions always resolve to a non-empty list,
//! and a comuna lookup nobody can answer resolves to an empty list that is
//! cached like any other answer.

mod embedded;
mod remote;
mod snapshot;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use thiserror::Error;
use tracing::{debug, info, instrument};

use gongora_core::GeoEntry;

use crate::config::GeoConfig;

pub use embedded::EmbeddedSource;
pub use remote::DpaClient;
pub use snapshot::{COMUNAS_FILE, REGIONS_FILE, SnapshotSource, write_snapshot};

/// Errors raised inside a geo tier.
///
/// Tiers log these and report a miss; they never reach a caller of
/// [`GeoResolver`].
#[derive(Debug, Error)]
pub enum GeoError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote API answered with a non-success status.
    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    /// Payload could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// Snapshot file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What is being looked up.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GeoKey {
    Regions,
    Comunas(String),
}

impl GeoKey {
    /// Cache key: `regions` or `comunas:<region_code>`.
    #[must_use]
    pub fn cache_key(&self) -> String {
        match self {
            Self::Regions => "regions".to_string(),
            Self::Comunas(region) => format!("comunas:{region}"),
        }
    }

    /// Whether a tier's answer is usable for this key.
    ///
    /// An empty region list is never a valid answer; an empty comuna list is.
    fn accepts(&self, entries: &[GeoEntry]) -> bool {
        match self {
            Self::Regions => !entries.is_empty(),
            Self::Comunas(_) => true,
        }
    }
}

/// One stage of the fallback chain.
#[async_trait]
pub trait GeoSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Answer the lookup, or `None` if this tier cannot.
    async fn fetch(&self, key: &GeoKey) -> Option<Vec<GeoEntry>>;
}

/// Cached, tiered resolver for regions and comunas.
#[derive(Clone)]
pub struct GeoResolver {
    inner: Arc<GeoResolverInner>,
}

struct GeoResolverInner {
    cache: Cache<String, Vec<GeoEntry>>,
    tiers: Vec<Arc<dyn GeoSource>>,
}

impl GeoResolver {
    /// Build the production chain: remote API, snapshot files, embedded data.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &GeoConfig) -> Result<Self, GeoError> {
        let tiers: Vec<Arc<dyn GeoSource>> = vec![
            Arc::new(DpaClient::new(config)?),
            Arc::new(SnapshotSource::new(config.snapshot_dir.clone())),
            Arc::new(EmbeddedSource),
        ];
        Ok(Self::with_tiers(tiers, config.cache_ttl))
    }

    /// Build a resolver over an explicit tier list.
    #[must_use]
    pub fn with_tiers(tiers: Vec<Arc<dyn GeoSource>>, cache_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(256)
            .time_to_live(cache_ttl)
            .build();

        Self {
            inner: Arc::new(GeoResolverInner { cache, tiers }),
        }
    }

    /// All regions, in the order the answering tier returned them.
    #[instrument(skip(self))]
    pub async fn get_regions(&self) -> Vec<GeoEntry> {
        self.resolve(GeoKey::Regions).await
    }

    /// Comunas of a region; empty when no tier knows the region.
    #[instrument(skip(self))]
    pub async fn get_comunas(&self, region_code: &str) -> Vec<GeoEntry> {
        self.resolve(GeoKey::Comunas(region_code.to_string())).await
    }

    async fn resolve(&self, key: GeoKey) -> Vec<GeoEntry> {
        let cache_key = key.cache_key();

        if let Some(entries) = self.inner.cache.get(&cache_key).await
            && key.accepts(&entries)
        {
            debug!(key = %cache_key, "Cache hit");
            return entries;
        }

        for tier in &self.inner.tiers {
            match tier.fetch(&key).await {
                Some(entries) if key.accepts(&entries) => {
                    debug!(key = %cache_key, tier = tier.name(), count = entries.len(), "Resolved");
                    self.inner.cache.insert(cache_key, entries.clone()).await;
                    return entries;
                }
                Some(_) => debug!(key = %cache_key, tier = tier.name(), "Tier returned no entries"),
                None => debug!(key = %cache_key, tier = tier.name(), "Tier missed"),
            }
        }

        info!(key = %cache_key, "No geo tier could answer; caching empty list");
        self.inner.cache.insert(cache_key, Vec::new()).await;
        Vec::new()
    }
}
