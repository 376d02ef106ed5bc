//! Data sources feeding a collection run.
//!
//! Each source talks to one remote API and hands back the payloads it
//! gathered as [`CollectedItem`]s. Sources know nothing about archives or
//! manifests.

pub mod auth;
pub mod platform_manager;
pub mod usage;

use async_trait::async_trait;
use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub use platform_manager::PlatformManagerSource;
pub use usage::UsageSource;

pub const JSON_MIME_TYPE: &str = "application/json";

pub const OPS_MANAGER_PRODUCT_TYPE: &str = "ops_manager";

pub const RESOURCES_DATA_TYPE: &str = "resources";
pub const VM_TYPES_DATA_TYPE: &str = "vm_types";
pub const DIAGNOSTIC_REPORT_DATA_TYPE: &str = "diagnostic_report";
pub const DEPLOYED_PRODUCTS_DATA_TYPE: &str = "deployed_products";
pub const INSTALLATIONS_DATA_TYPE: &str = "installations";
pub const PROPERTIES_DATA_TYPE: &str = "properties";
pub const APP_USAGES_DATA_TYPE: &str = "app_usages";
pub const SERVICE_USAGES_DATA_TYPE: &str = "service_usages";
pub const TASK_USAGES_DATA_TYPE: &str = "task_usages";

/// Error raised by a data source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Error accessing {url}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected status {status} when accessing {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Unable to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One payload produced by a source.
pub struct CollectedItem {
    /// Unique within its group. Must not contain `/` or `.`.
    pub name: String,
    pub mime_type: String,
    pub product_type: String,
    pub data_type: String,
    /// Read exactly once by the collection executor.
    pub content: Box<dyn Read + Send>,
}

impl CollectedItem {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        product_type: impl Into<String>,
        data_type: impl Into<String>,
        content: impl Read + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            product_type: product_type.into(),
            data_type: data_type.into(),
            content: Box::new(content),
        }
    }

    /// A JSON payload held in memory.
    pub fn json(
        name: impl Into<String>,
        product_type: impl Into<String>,
        data_type: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        Self::new(name, JSON_MIME_TYPE, product_type, data_type, Cursor::new(body))
    }
}

impl fmt::Debug for CollectedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectedItem")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("product_type", &self.product_type)
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}

/// A remote API that can be asked for its data.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &str;

    /// Fetch every item this source provides.
    async fn collect(&self) -> Result<Vec<CollectedItem>, SourceError>;
}

#[async_trait]
impl<T: DataSource + ?Sized> DataSource for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, SourceError> {
        (**self).collect().await
    }
}

/// Join `path` onto `base`, checking that the result is a valid URL.
pub(crate) fn endpoint(base: &str, path: &str) -> Result<reqwest::Url, SourceError> {
    let url = format!("{}{}", base.trim_end_matches('/'), path);
    reqwest::Url::parse(&url).map_err(|e| SourceError::InvalidUrl {
        url,
        reason: e.to_string(),
    })
}

/// GET `url` with `Authorization: bearer <token>` and return the body of a 200 response.
pub(crate) async fn get_authorized(
    client: &reqwest::Client,
    url: reqwest::Url,
    token: &str,
) -> Result<Vec<u8>, SourceError> {
    debug!("GET {}", url);
    let response = client
        .get(url.clone())
        .header(reqwest::header::AUTHORIZATION, format!("bearer {}", token))
        .send()
        .await
        .map_err(|source| SourceError::Request {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(SourceError::UnexpectedStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await.map_err(|source| SourceError::Request {
        url: url.to_string(),
        source,
    })?;
    Ok(body.to_vec())
}
