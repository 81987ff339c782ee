//! Administrative geography entries (regions, provinces, comunas).

use serde::{Deserialize, Serialize};

/// One `{code, name}` pair from the DPA (División Político Administrativa).
///
/// Serialized with the Spanish field names used by the public DPA API and by
/// the storefront's address form: `{"codigo": "13", "nombre": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoEntry {
    /// DPA code, e.g. `"13"` for a region or `"13101"` for a comuna.
    #[serde(rename = "codigo")]
    pub code: String,
    /// Display name.
    #[serde(rename = "nombre")]
    pub name: String,
}

impl GeoEntry {
    /// Create an entry.
    #[must_use]
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}
