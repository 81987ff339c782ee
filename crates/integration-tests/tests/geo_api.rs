//! Region and comuna endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;

use gongora_core::GeoEntry;
use gongora_integration_tests::TestApp;
use gongora_storefront::geo::{EmbeddedSource, GeoKey, GeoResolver, GeoSource, SnapshotSource};

/// Remote tier that is always down.
struct Unreachable;

#[async_trait]
impl GeoSource for Unreachable {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn fetch(&self, _key: &GeoKey) -> Option<Vec<GeoEntry>> {
        None
    }
}

#[tokio::test]
async fn test_regions_from_embedded_list() {
    let mut app = TestApp::new();

    let response = app.get("/api/regiones/").await;
    assert_eq!(response.status, StatusCode::OK);

    let regions = response.json();
    assert_eq!(regions.as_array().unwrap().len(), 16);
    assert!(
        regions
            .as_array()
            .unwrap()
            .contains(&json!({"codigo": "13", "nombre": "Región Metropolitana de Santiago"}))
    );
}

#[tokio::test]
async fn test_comunas_for_known_region() {
    let mut app = TestApp::new();

    let response = app.get("/api/regiones/13/comunas/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()[0], json!({"codigo": "13101", "nombre": "Santiago"}));
}

#[tokio::test]
async fn test_unknown_region_is_empty_list() {
    let mut app = TestApp::new();

    let response = app.get("/api/regiones/99/comunas/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!([]));
}

#[tokio::test]
async fn test_snapshot_wins_over_embedded_when_remote_is_down() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("regiones.json"),
        r#"[{"codigo": "05", "nombre": "Valparaíso"}]"#,
    )
    .unwrap();

    let tiers: Vec<Arc<dyn GeoSource>> = vec![
        Arc::new(Unreachable),
        Arc::new(SnapshotSource::new(dir.path().to_path_buf())),
        Arc::new(EmbeddedSource),
    ];
    let mut app = TestApp::with_geo(GeoResolver::with_tiers(tiers, Duration::from_secs(60)));

    let response = app.get("/api/regiones/").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!([{"codigo": "05", "nombre": "Valparaíso"}]));
}
