//! Usage service data source.
//!
//! The usage service authenticates against the same UAA as the Cloud
//! Foundry API, so the token endpoint is discovered from the API's
//! `/v2/info` document before any report is fetched.

use super::auth::{fetch_token, Grant};
use super::{
    endpoint, get_authorized, CollectedItem, DataSource, SourceError, APP_USAGES_DATA_TYPE,
    SERVICE_USAGES_DATA_TYPE, TASK_USAGES_DATA_TYPE,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const SYSTEM_REPORT_PATH_PREFIX: &str = "/system_report";

#[derive(Debug, Deserialize)]
struct CfInfo {
    token_endpoint: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Usage {
    month: i32,
    year: i32,
    duration_in_hours: f64,
    average_instances: f64,
    maximum_instances: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PlanUsages {
    usages: Vec<Usage>,
    service_plan_guid: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct MonthlyServiceReport {
    service_name: String,
    service_guid: String,
    usages: Vec<Usage>,
    plans: Vec<PlanUsages>,
}

#[derive(Debug, Serialize, Deserialize)]
struct YearlyPlanReport {
    year: i32,
    service_plan_guid: String,
    duration_in_hours: f64,
    maximum_instances: f64,
    average_instances: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct YearlyServiceReport {
    service_name: String,
    service_guid: String,
    year: i32,
    duration_in_hours: f64,
    maximum_instances: f64,
    average_instances: f64,
    plans: Vec<YearlyPlanReport>,
}

/// Service usage report reduced to the fields we are allowed to ship.
#[derive(Debug, Serialize, Deserialize)]
struct ServiceReport {
    report_time: String,
    monthly_service_reports: Vec<MonthlyServiceReport>,
    yearly_service_report: Vec<YearlyServiceReport>,
}

/// Collects app, service and task usage reports.
pub struct UsageSource {
    client: reqwest::Client,
    cf_api_url: String,
    usage_service_url: String,
    client_id: String,
    client_secret: String,
}

impl UsageSource {
    pub fn new(
        client: reqwest::Client,
        cf_api_url: impl Into<String>,
        usage_service_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            cf_api_url: cf_api_url.into(),
            usage_service_url: usage_service_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    async fn uaa_url(&self) -> Result<String, SourceError> {
        let url = endpoint(&self.cf_api_url, "/v2/info")?;
        debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| SourceError::Request {
                url: url.to_string(),
                source,
            })?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(SourceError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let body = response.bytes().await.map_err(|source| SourceError::Request {
            url: url.to_string(),
            source,
        })?;
        let info: CfInfo = serde_json::from_slice(&body).map_err(|source| SourceError::Decode {
            url: url.to_string(),
            source,
        })?;
        Ok(info.token_endpoint)
    }
}

/// Drop every field of a service usage report that is not part of [`ServiceReport`].
fn redact_service_report(url: &reqwest::Url, body: &[u8]) -> Result<Vec<u8>, SourceError> {
    let decode = |source| SourceError::Decode {
        url: url.to_string(),
        source,
    };
    let report: ServiceReport = serde_json::from_slice(body).map_err(decode)?;
    serde_json::to_vec(&report).map_err(decode)
}

#[async_trait]
impl DataSource for UsageSource {
    fn name(&self) -> &str {
        "usage service"
    }

    async fn collect(&self) -> Result<Vec<CollectedItem>, SourceError> {
        // Fail on a bad usage URL before touching the network.
        endpoint(&self.usage_service_url, SYSTEM_REPORT_PATH_PREFIX)?;

        let uaa_url = self.uaa_url().await?;
        let token_url = endpoint(&uaa_url, "/oauth/token")?;
        let grant = Grant::ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        };
        let token = fetch_token(&self.client, token_url, &grant).await?;

        let mut items = Vec::new();
        for report in [
            APP_USAGES_DATA_TYPE,
            SERVICE_USAGES_DATA_TYPE,
            TASK_USAGES_DATA_TYPE,
        ] {
            let path = format!("{}/{}", SYSTEM_REPORT_PATH_PREFIX, report);
            let url = endpoint(&self.usage_service_url, &path)?;
            let mut body = get_authorized(&self.client, url.clone(), &token).await?;
            if report == SERVICE_USAGES_DATA_TYPE {
                body = redact_service_report(&url, &body)?;
            }
            items.push(CollectedItem::json(report, "", report, body));
        }

        info!("Collected {} usage reports", items.len());
        Ok(items)
    }
}
