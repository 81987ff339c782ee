//! Region and comuna lookups for the address form.
//!
//! Both endpoints always answer `200` with a JSON array; lookup failures
//! degrade to fallback data or an empty list inside [`crate::geo`].

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use gongora_core::GeoEntry;

use crate::state::AppState;

/// All regions.
#[instrument(skip(state))]
pub async fn regions(State(state): State<AppState>) -> Json<Vec<GeoEntry>> {
    Json(state.geo().get_regions().await)
}

/// Comunas of one region; `[]` for an unknown code.
#[instrument(skip(state))]
pub async fn comunas(
    State(state): State<AppState>,
    Path(region_code): Path<String>,
) -> Json<Vec<GeoEntry>> {
    Json(state.geo().get_comunas(&region_code).await)
}
