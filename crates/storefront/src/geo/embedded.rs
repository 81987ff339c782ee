//! Last-resort geo data compiled into the binary.

use async_trait::async_trait;

use gongora_core::GeoEntry;

use super::{GeoKey, GeoSource};

/// All sixteen regions, by DPA code.
const REGIONS: &[(&str, &str)] = &[
    ("01", "Región de Tarapacá"),
    ("02", "Región de Antofagasta"),
    ("03", "Región de Atacama"),
    ("04", "Región de Coquimbo"),
    ("05", "Región de Valparaíso"),
    ("06", "Región del Libertador General Bernardo O'Higgins"),
    ("07", "Región del Maule"),
    ("08", "Región del Biobío"),
    ("09", "Región de La Araucanía"),
    ("10", "Región de Los Lagos"),
    ("11", "Región de Aysén del Gral. C. Ibáñez del Campo"),
    ("12", "Región de Magallanes y de la Antártica Chilena"),
    ("13", "Región Metropolitana de Santiago"),
    ("14", "Región de Los Ríos"),
    ("15", "Región de Arica y Parinacota"),
    ("16", "Región de Ñuble"),
];

/// Comunas for the regions where most orders ship.
const COMUNAS: &[(&str, &[(&str, &str)])] = &[
    (
        "05",
        &[
            ("05101", "Valparaíso"),
            ("05107", "Viña del Mar"),
            ("05109", "Quilpué"),
            ("05110", "Villa Alemana"),
            ("05111", "Concón"),
        ],
    ),
    (
        "13",
        &[
            ("13101", "Santiago"),
            ("13114", "Las Condes"),
            ("13123", "Ñuñoa"),
            ("13132", "Puente Alto"),
            ("13119", "Maipú"),
        ],
    ),
];

fn to_entries(pairs: &[(&str, &str)]) -> Vec<GeoEntry> {
    pairs
        .iter()
        .map(|(code, name)| GeoEntry::new(*code, *name))
        .collect()
}

/// Tier backed by the constants above.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedSource;

#[async_trait]
impl GeoSource for EmbeddedSource {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn fetch(&self, key: &GeoKey) -> Option<Vec<GeoEntry>> {
        match key {
            GeoKey::Regions => Some(to_entries(REGIONS)),
            GeoKey::Comunas(region) => COMUNAS
                .iter()
                .find(|(code, _)| *code == region.as_str())
                .map(|(_, comunas)| to_entries(comunas)),
        }
    }
}
