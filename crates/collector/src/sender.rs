//! Upload of a validated archive to the data loader.

use courier_bundle_schema::{validate_archive, ArchiveReader, ValidationError};
use courier_common::hash;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Ingestion path appended to the destination URL.
pub const POST_PATH: &str = "/collections/batch";

pub const TAR_MIME_TYPE: &str = "application/x-tar";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error raised while sending an archive.
#[derive(Error, Debug)]
pub enum SendError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Unable to read data file {}", path.display())]
    ReadDataFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to encode upload metadata")]
    MetadataEncode(#[source] serde_json::Error),

    #[error("Failed to create request to {url}")]
    RequestCreation {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to POST data to {url}")]
    PostFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response code {0} from the data loader")]
    UnexpectedResponseCode(u16),
}

/// Request-level description of the uploaded archive.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadMetadata {
    filename: String,
    env_type: String,
    collected_at: String,
    collection_id: String,
    file_content_type: String,
    file_md5_checksum: String,
}

/// Sends one archive per call, with no retry.
pub struct SendExecutor {
    client: reqwest::Client,
}

impl SendExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Validate the archive behind `reader` and POST it to `destination_url`.
    pub async fn send<R: ArchiveReader + ?Sized>(
        &self,
        reader: &R,
        destination_url: &str,
        api_key: &str,
    ) -> Result<(), SendError> {
        let manifest = validate_archive(reader)?;

        let path = reader.archive_path();
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| SendError::ReadDataFile {
                path: path.to_path_buf(),
                source,
            })?;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let metadata = UploadMetadata {
            filename: filename.clone(),
            env_type: manifest.env_type,
            collected_at: manifest.collected_at,
            collection_id: manifest.collection_id,
            file_content_type: TAR_MIME_TYPE.to_string(),
            file_md5_checksum: hash::md5_base64(&data),
        };
        let metadata = serde_json::to_string(&metadata).map_err(SendError::MetadataEncode)?;

        let url = format!("{}{}", destination_url.trim_end_matches('/'), POST_PATH);
        let request_error = |source: BoxError| SendError::RequestCreation {
            url: url.clone(),
            source,
        };

        let parsed = reqwest::Url::parse(&url).map_err(|e| request_error(e.into()))?;
        let token = HeaderValue::from_str(&format!("Token {}", api_key))
            .map_err(|e| request_error(e.into()))?;
        let size = data.len();
        let part = Part::bytes(data)
            .file_name(filename)
            .mime_str(TAR_MIME_TYPE)
            .map_err(|e| request_error(e.into()))?;
        let form = Form::new().part("data", part).text("metadata", metadata);

        debug!("POST {} ({} bytes)", parsed, size);
        let response = self
            .client
            .post(parsed)
            .header(AUTHORIZATION, token)
            .multipart(form)
            .send()
            .await
            .map_err(|source| SendError::PostFailed {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::CREATED {
            return Err(SendError::UnexpectedResponseCode(status.as_u16()));
        }

        info!("Sent {} to {}", path.display(), url);
        Ok(())
    }
}
