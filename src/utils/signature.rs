// src/utils/signature.rs
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::models::{SiteRecord, TrackedField};

/// Content hash of a catalog row. Stable across runs as long as the name and
/// the resolved attributes do not change, so a storage layer can skip
/// unchanged rows.
pub fn site_signature(site: &SiteRecord) -> String {
    let mut components: BTreeMap<&str, String> = BTreeMap::new();
    components.insert("canonical_name", site.canonical_name.clone());
    for field in TrackedField::ALL {
        let value = match field {
            TrackedField::Latitude => site.latitude.map(|v| format!("{:.6}", v)),
            TrackedField::Longitude => site.longitude.map(|v| format!("{:.6}", v)),
            TrackedField::County => site.county.clone(),
            TrackedField::RiverBasin => site.river_basin.clone(),
            TrackedField::Ecoregion => site.ecoregion.clone(),
        };
        components.insert(field.as_str(), value.unwrap_or_default());
    }

    let mut hasher = Sha256::new();
    for (key, value) in components {
        hasher.update(format!("{}:{}", key, value).as_bytes());
    }
    hex::encode(hasher.finalize())
}
