//! Geo snapshot export.
//!
//! Pulls every region and its comunas from the DPA API and writes the two
//! JSON files read by the storefront's snapshot tier.
//!
//! # Usage
//!
//! ```bash
//! gongora geo export --dir crates/storefront/data
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use gongora_storefront::config::GeoConfig;
use gongora_storefront::geo::{DpaClient, GeoError, write_snapshot};

/// Export regions and comunas from `base_url` into `dir`.
///
/// Fails without writing anything if any region cannot be fetched, so a
/// snapshot is never partial.
///
/// # Errors
///
/// Returns the first DPA request that fails after retries, or an I/O error
/// while writing the files.
pub async fn export(dir: &Path, base_url: &str) -> Result<(), GeoError> {
    let config = GeoConfig {
        api_base_url: base_url.trim_end_matches('/').to_string(),
        ..GeoConfig::default()
    };
    let client = DpaClient::new(&config)?;

    export_with(&client, dir).await
}

async fn export_with(client: &DpaClient, dir: &Path) -> Result<(), GeoError> {
    let regions = client.fetch_regions().await?;
    info!(regions = regions.len(), "Fetched regions");

    let mut comunas_by_region = BTreeMap::new();
    for region in &regions {
        let comunas = client.fetch_comunas(&region.code).await?;
        info!(region = %region.code, comunas = comunas.len(), "Fetched comunas");
        comunas_by_region.insert(region.code.clone(), comunas);
    }

    write_snapshot(dir, &regions, &comunas_by_region).await?;
    info!(dir = %dir.display(), "Geo snapshot written");
    Ok(())
}
