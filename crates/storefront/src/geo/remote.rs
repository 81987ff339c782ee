//! Client for the public DPA API (División Político Administrativa).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use gongora_core::GeoEntry;

use super::{GeoError, GeoKey, GeoSource};
use crate::config::GeoConfig;

const CLIENT_USER_AGENT: &str = "GongoraStore/1.0";

/// DPA API client with per-request retry.
///
/// Every GET is attempted `retries + 1` times. After the n-th failed attempt
/// the client sleeps `backoff_step × n` before trying again.
#[derive(Clone)]
pub struct DpaClient {
    client: reqwest::Client,
    base_url: String,
    retries: u32,
    backoff_step: Duration,
}

impl DpaClient {
    /// Create a client from geo configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &GeoConfig) -> Result<Self, GeoError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            retries: config.retries,
            backoff_step: config.backoff_step,
        })
    }

    /// Fetch all regions.
    ///
    /// # Errors
    ///
    /// Returns the last error once every attempt has failed.
    #[instrument(skip(self))]
    pub async fn fetch_regions(&self) -> Result<Vec<GeoEntry>, GeoError> {
        self.get_json(&format!("{}/regiones", self.base_url)).await
    }

    /// Fetch the comunas of a region, province by province.
    ///
    /// Comunas are concatenated in province order. Any failed request fails
    /// the whole lookup.
    ///
    /// # Errors
    ///
    /// Returns the first request that still fails after its retries.
    #[instrument(skip(self))]
    pub async fn fetch_comunas(&self, region_code: &str) -> Result<Vec<GeoEntry>, GeoError> {
        let provinces: Vec<GeoEntry> = self
            .get_json(&format!(
                "{}/regiones/{}/provincias",
                self.base_url,
                urlencoding::encode(region_code)
            ))
            .await?;

        let mut comunas = Vec::new();
        for province in &provinces {
            let batch: Vec<GeoEntry> = self
                .get_json(&format!(
                    "{}/provincias/{}/comunas",
                    self.base_url,
                    urlencoding::encode(&province.code)
                ))
                .await?;
            comunas.extend(batch);
        }

        debug!(provinces = provinces.len(), comunas = comunas.len(), "Fetched comunas");
        Ok(comunas)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, GeoError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_once(url).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(url = %url, attempt, error = %e, "DPA request failed");
                    tokio::time::sleep(self.backoff_step * attempt).await;
                    if attempt > self.retries {
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, GeoError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(GeoError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| GeoError::Parse(e.to_string()))
    }
}

#[async_trait]
impl GeoSource for DpaClient {
    fn name(&self) -> &'static str {
        "dpa"
    }

    async fn fetch(&self, key: &GeoKey) -> Option<Vec<GeoEntry>> {
        let result = match key {
            GeoKey::Regions => self.fetch_regions().await,
            GeoKey::Comunas(region) => self.fetch_comunas(region).await,
        };

        match result {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!(key = %key.cache_key(), error = %e, "DPA API unavailable, falling back");
                None
            }
        }
    }
}
