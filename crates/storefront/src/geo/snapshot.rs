//! Geo snapshot files on disk.
//!
//! A snapshot directory holds two files produced by `gongora geo export`:
//!
//! - `regiones.json` - array of `{codigo, nombre}`
//! - `comunas_by_region.json` - object mapping region code to such an array

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use gongora_core::GeoEntry;

use super::{GeoError, GeoKey, GeoSource};

pub const REGIONS_FILE: &str = "regiones.json";
pub const COMUNAS_FILE: &str = "comunas_by_region.json";

/// Reads regions and comunas from a snapshot directory.
///
/// Missing or unreadable files are a miss, not an error.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    dir: PathBuf,
}

impl SnapshotSource {
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    async fn load<T: DeserializeOwned>(&self, file: &str) -> Option<T> {
        let path = self.dir.join(file);
        match read_json(&path).await {
            Ok(value) => Some(value),
            Err(GeoError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No snapshot file");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable snapshot file");
                None
            }
        }
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, GeoError> {
    let bytes = tokio::fs::read(path).await?;
    serde_json::from_slice(&bytes).map_err(|e| GeoError::Parse(e.to_string()))
}

#[async_trait]
impl GeoSource for SnapshotSource {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn fetch(&self, key: &GeoKey) -> Option<Vec<GeoEntry>> {
        match key {
            GeoKey::Regions => self
                .load::<Vec<GeoEntry>>(REGIONS_FILE)
                .await
                .filter(|regions| !regions.is_empty()),
            GeoKey::Comunas(region) => self
                .load::<BTreeMap<String, Vec<GeoEntry>>>(COMUNAS_FILE)
                .await
                .and_then(|mut by_region| by_region.remove(region)),
        }
    }
}

/// Write both snapshot files into `dir`, creating it if needed.
///
/// # Errors
///
/// Returns `GeoError::Io` if the directory or a file cannot be written.
pub async fn write_snapshot(
    dir: &Path,
    regions: &[GeoEntry],
    comunas_by_region: &BTreeMap<String, Vec<GeoEntry>>,
) -> Result<(), GeoError> {
    tokio::fs::create_dir_all(dir).await?;

    let regions_json =
        serde_json::to_vec_pretty(regions).map_err(|e| GeoError::Parse(e.to_string()))?;
    tokio::fs::write(dir.join(REGIONS_FILE), regions_json).await?;

    let comunas_json = serde_json::to_vec_pretty(comunas_by_region)
        .map_err(|e| GeoError::Parse(e.to_string()))?;
    tokio::fs::write(dir.join(COMUNAS_FILE), comunas_json).await?;

    Ok(())
}
