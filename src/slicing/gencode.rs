//! Gene name to region lookup.
//!
//! The map is a JSON object from gene names to lists of `[ref, beg, end]`
//! triples in 1-based closed coordinates. `beg` and `end` may be `null`,
//! with the same meaning as omitting them from a coordinate string.
//!
//! ```json
//! { "BRCA1": [["chr17", 43044295, 43125483]] }
//! ```

use super::region::Region;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
struct GeneRegion(String, Option<u64>, Option<u64>);

impl From<&GeneRegion> for Region {
    fn from(GeneRegion(name, begin, end): &GeneRegion) -> Self {
        Region::new(
            name.clone(),
            begin.map(|b| b.saturating_sub(1)),
            *end,
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct GencodeMap {
    genes: HashMap<String, Vec<GeneRegion>>,
}

impl GencodeMap {
    pub fn from_json(json: &str) -> Result<Self> {
        let map: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("invalid gencode map: {}", e)))?;

        for (gene, regions) in &map.genes {
            for GeneRegion(name, begin, end) in regions {
                // Positions are 1-based.
                if *begin == Some(0) || *end == Some(0) {
                    return Err(Error::InvalidInput(format!(
                        "{}: position 0 in {}:{}-{}",
                        gene,
                        name,
                        begin.unwrap_or_default(),
                        end.unwrap_or_default()
                    )));
                }
                if let (Some(begin), Some(end)) = (begin, end) {
                    if end < begin {
                        return Err(Error::InvalidRange(format!(
                            "{}: {}:{}-{}",
                            gene, name, begin, end
                        )));
                    }
                }
            }
        }
        Ok(map)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load the map at `path`, falling back to an empty map with a warning.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match Self::load(path) {
            Ok(map) => {
                info!(path = %path.display(), genes = map.len(), "loaded gencode map");
                map
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load gencode map");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Regions for `gene`.
    pub fn regions(&self, gene: &str) -> Result<Vec<Region>> {
        self.genes
            .get(gene)
            .map(|regions| regions.iter().map(Region::from).collect())
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "could not load regions for gencode gene name: {}",
                    gene
                ))
            })
    }
}
