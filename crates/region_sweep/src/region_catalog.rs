use std::collections::BTreeMap;
use std::path::Path;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::sweep_types::{RegionCode, SweepError};

/// Selector that expands to every region in the catalog
pub const ALL_REGIONS: &str = "all";

/// Nationwide selector accepted as an alias of [`ALL_REGIONS`]
pub const NATIONWIDE_ALIAS: &str = "전국";

/// Static mapping from region-group name to its ordered region codes
#[derive(Debug, Clone)]
pub struct RegionCatalog {
    groups: BTreeMap<String, Vec<RegionCode>>,
}

impl RegionCatalog {
    /// Build a catalog from already-parsed groups
    pub fn new(groups: BTreeMap<String, Vec<RegionCode>>) -> Result<Self, SweepError> {
        if groups.is_empty() {
            return Err(SweepError::Configuration(
                "Region catalog has no groups".to_string(),
            ));
        }

        Ok(Self { groups })
    }

    /// Parse a catalog from a JSON object of `group -> [codes]`
    pub fn from_json_str(json: &str) -> Result<Self, SweepError> {
        let groups: BTreeMap<String, Vec<RegionCode>> = serde_json::from_str(json)
            .map_err(|e| SweepError::Configuration(format!("Invalid region catalog: {}", e)))?;

        Self::new(groups)
    }

    /// Load the catalog file; a missing file is a configuration error
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SweepError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SweepError::Configuration(format!(
                "Could not read region catalog {}: {}",
                path.display(),
                e
            ))
        })?;

        let catalog = Self::from_json_str(&contents)?;
        info!(
            "Loaded region catalog with {} groups and {} codes from {}",
            catalog.groups.len(),
            catalog.region_count(),
            path.display()
        );

        Ok(catalog)
    }

    /// Names of all groups, sorted
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Total number of codes across every group
    pub fn region_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Whether `selector` means "every region"
    pub fn is_all_selector(selector: &str) -> bool {
        selector.eq_ignore_ascii_case(ALL_REGIONS) || selector == NATIONWIDE_ALIAS
    }

    /// Expand a selector into the codes to sweep
    ///
    /// A group name yields that group's codes in catalog order. The "all"
    /// selector yields every code, shuffled so no code is always first or
    /// last across runs.
    pub fn expand(&self, selector: &str) -> Result<Vec<RegionCode>, SweepError> {
        self.expand_with_rng(selector, &mut rand::rng())
    }

    /// Same as [`RegionCatalog::expand`] with a caller-supplied RNG
    pub fn expand_with_rng<R: Rng + ?Sized>(
        &self,
        selector: &str,
        rng: &mut R,
    ) -> Result<Vec<RegionCode>, SweepError> {
        if Self::is_all_selector(selector) {
            let mut codes: Vec<RegionCode> = self.groups.values().flatten().cloned().collect();
            codes.shuffle(rng);
            debug!("Expanded '{}' to {} shuffled codes", selector, codes.len());
            return Ok(codes);
        }

        self.groups
            .get(selector)
            .cloned()
            .ok_or_else(|| SweepError::UnknownRegion {
                selector: selector.to_string(),
            })
    }
}
