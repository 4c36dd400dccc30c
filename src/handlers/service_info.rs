use super::AppState;
use crate::types::{
    BAM_CONTENT_TYPE, Organization, ServiceInfo, ServiceType, SlicingCapabilities,
};
use axum::{Json, extract::State};

pub async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        id: "org.example.htslice".to_string(),
        name: "htslice".to_string(),
        r#type: ServiceType {
            group: "org.example".to_string(),
            artifact: "bam-slicing".to_string(),
            version: "1.0.0".to_string(),
        },
        description: Some("BAM coordinate slicing server".to_string()),
        organization: Organization {
            name: "Example Organization".to_string(),
            url: "https://example.org".to_string(),
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        slicing: SlicingCapabilities {
            formats: vec!["BAM".to_string()],
            content_type: BAM_CONTENT_TYPE.to_string(),
            block_size: state.block_size,
            gencode_genes: state.gencode.len(),
        },
    })
}
