//! Platform manager (Operations Manager) data source.

use super::auth::{fetch_token, Grant};
use super::{
    endpoint, get_authorized, CollectedItem, DataSource, SourceError, DEPLOYED_PRODUCTS_DATA_TYPE,
    DIAGNOSTIC_REPORT_DATA_TYPE, INSTALLATIONS_DATA_TYPE, OPS_MANAGER_PRODUCT_TYPE,
    PROPERTIES_DATA_TYPE, RESOURCES_DATA_TYPE, VM_TYPES_DATA_TYPE,
};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

const TOKEN_PATH: &str = "/uaa/oauth/token";

/// Foundation-wide reports, stored under their data type name.
const FOUNDATION_REPORTS: [(&str, &str); 4] = [
    (INSTALLATIONS_DATA_TYPE, "/api/v0/installations"),
    (DIAGNOSTIC_REPORT_DATA_TYPE, "/api/v0/diagnostic_report"),
    (DEPLOYED_PRODUCTS_DATA_TYPE, "/api/v0/deployed/products"),
    (VM_TYPES_DATA_TYPE, "/api/v0/vm_types"),
];

#[derive(Debug, Deserialize)]
struct DeployedProduct {
    guid: String,
    #[serde(rename = "type")]
    product_type: String,
}

/// Collects installation, product and VM data from the platform manager API.
pub struct PlatformManagerSource {
    client: reqwest::Client,
    base_url: String,
    grant: Grant,
}

impl PlatformManagerSource {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, grant: Grant) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            grant,
        }
    }
}

#[async_trait]
impl DataSource for PlatformManagerSource {
    fn name(&self) -> &str {
        "platform manager"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, SourceError> {
        let token_url = endpoint(&self.base_url, TOKEN_PATH)?;
        let token = fetch_token(&self.client, token_url, &self.grant).await?;

        let mut items = Vec::new();
        let mut deployed_products = Vec::new();

        for (data_type, path) in FOUNDATION_REPORTS {
            let url = endpoint(&self.base_url, path)?;
            let body = get_authorized(&self.client, url.clone(), &token).await?;

            if data_type == DEPLOYED_PRODUCTS_DATA_TYPE {
                deployed_products = serde_json::from_slice::<Vec<DeployedProduct>>(&body)
                    .map_err(|source| SourceError::Decode {
                        url: url.to_string(),
                        source,
                    })?;
            }

            items.push(CollectedItem::json(
                data_type,
                OPS_MANAGER_PRODUCT_TYPE,
                data_type,
                body,
            ));
        }

        for product in &deployed_products {
            for data_type in [RESOURCES_DATA_TYPE, PROPERTIES_DATA_TYPE] {
                let path = format!("/api/v0/staged/products/{}/{}", product.guid, data_type);
                let url = endpoint(&self.base_url, &path)?;
                let body = get_authorized(&self.client, url, &token).await?;
                items.push(CollectedItem::json(
                    format!("{}_{}", product.guid, data_type),
                    product.product_type.as_str(),
                    data_type,
                    body,
                ));
            }
        }

        info!(
            "Collected {} items from the platform manager ({} deployed products)",
            items.len(),
            deployed_products.len()
        );
        Ok(items)
    }
}
