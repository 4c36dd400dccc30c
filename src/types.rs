use serde::{Deserialize, Serialize};

pub const BAM_CONTENT_TYPE: &str = "application/vnd.ga4gh.bam";

/// Query parameters for `GET /slice/{id}`.
///
/// `region`, `regions` and `genes` are comma-separated lists; `region` and
/// `regions` are combined.
#[derive(Debug, Deserialize, Default)]
pub struct SliceQuery {
    pub region: Option<String>,
    pub regions: Option<String>,
    pub genes: Option<String>,
    pub bai: Option<String>,
    #[serde(default)]
    pub unmapped: bool,
    #[serde(default)]
    pub attachment: bool,
}

impl SliceQuery {
    pub fn region_list(&self) -> Vec<String> {
        let mut regions = split_list(self.region.as_deref());
        regions.extend(split_list(self.regions.as_deref()));
        regions
    }

    pub fn gene_list(&self) -> Vec<String> {
        split_list(self.genes.as_deref())
    }
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// JSON body for `POST /slice/{id}`.
#[derive(Debug, Deserialize, Default)]
pub struct SliceRequest {
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub gencode: Vec<String>,
    pub bai: Option<String>,
    #[serde(default)]
    pub unmapped: bool,
    #[serde(default)]
    pub attachment: bool,
}

impl From<SliceQuery> for SliceRequest {
    fn from(query: SliceQuery) -> Self {
        Self {
            regions: query.region_list(),
            gencode: query.gene_list(),
            bai: query.bai,
            unmapped: query.unmapped,
            attachment: query.attachment,
        }
    }
}

/// GA4GH service-info response
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub id: String,
    pub name: String,
    pub r#type: ServiceType,
    pub description: Option<String>,
    pub organization: Organization,
    pub version: String,
    pub slicing: SlicingCapabilities,
}

#[derive(Debug, Serialize)]
pub struct ServiceType {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct Organization {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct SlicingCapabilities {
    pub formats: Vec<String>,
    #[serde(rename = "contentType")]
    pub content_type: String,
    #[serde(rename = "blockSize")]
    pub block_size: usize,
    #[serde(rename = "gencodeGenes")]
    pub gencode_genes: usize,
}
