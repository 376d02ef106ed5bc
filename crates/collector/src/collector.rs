//! Collection run orchestration.

use crate::archive::ArchiveWriter;
use crate::sources::{CollectedItem, DataSource, SourceError};
use courier_bundle_schema::{
    is_valid_member_name, member_name, FileDigest, Metadata, MANIFEST_FILE_NAME,
    PLATFORM_MANAGER_GROUP, USAGE_GROUP,
};
use courier_common::{hash, Timestamp};
use std::collections::BTreeSet;
use std::io::{self, Read};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error raised by a collection run.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Failed collecting from the platform manager")]
    PlatformManager(#[source] SourceError),

    #[error("Failed collecting from the secrets manager")]
    SecretsManager(#[source] SourceError),

    #[error("Failed collecting from the usage service")]
    Usage(#[source] SourceError),

    #[error("Failed to read content of {name}")]
    ContentRead {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed writing data to {name}")]
    DataWrite {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Item {name} in {group} has an invalid name")]
    InvalidItemName { group: &'static str, name: String },

    #[error("Item {name} appears more than once in {group}")]
    DuplicateItem { group: &'static str, name: String },

    #[error("Failed encoding metadata for {group}")]
    MetadataEncode {
        group: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Runs every configured source once and writes the results into one archive.
///
/// The platform manager source is mandatory. The secrets manager and usage
/// sources are optional; leaving one out is not an error.
pub struct CollectExecutor<W: ArchiveWriter> {
    platform_manager: Box<dyn DataSource>,
    secrets_manager: Option<Box<dyn DataSource>>,
    usage: Option<Box<dyn DataSource>>,
    writer: W,
}

impl<W: ArchiveWriter> CollectExecutor<W> {
    pub fn new(
        platform_manager: Box<dyn DataSource>,
        secrets_manager: Option<Box<dyn DataSource>>,
        usage: Option<Box<dyn DataSource>>,
        writer: W,
    ) -> Self {
        Self {
            platform_manager,
            secrets_manager,
            usage,
            writer,
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Collect from every source and write the archive.
    ///
    /// The writer is closed whether or not the run succeeds, so a failed run
    /// still leaves a finished archive behind for inspection.
    pub async fn collect(
        &mut self,
        env_type: &str,
        collector_version: &str,
    ) -> Result<(), CollectError> {
        let result = self.run(env_type, collector_version).await;

        match (result, self.writer.close()) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(source)) => Err(CollectError::DataWrite {
                name: "archive".to_string(),
                source,
            }),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!("Failed to close archive after error: {}", close_err);
                Err(e)
            }
        }
    }

    async fn run(&mut self, env_type: &str, collector_version: &str) -> Result<(), CollectError> {
        let collected_at = Timestamp::now().to_rfc3339();
        let collection_id = uuid::Uuid::new_v4().to_string();
        info!("Starting collection {} at {}", collection_id, collected_at);

        let metadata = Metadata::new(collector_version, env_type, &collected_at, &collection_id);
        let mut platform_group = Group::new(PLATFORM_MANAGER_GROUP, metadata.clone());
        let mut usage_group = Group::new(USAGE_GROUP, metadata);

        info!("Collecting from {}...", self.platform_manager.name());
        let items = self
            .platform_manager
            .collect()
            .await
            .map_err(CollectError::PlatformManager)?;
        platform_group.add_data(&mut self.writer, items)?;

        if let Some(secrets_manager) = &self.secrets_manager {
            info!("Collecting from {}...", secrets_manager.name());
            let items = secrets_manager
                .collect()
                .await
                .map_err(CollectError::SecretsManager)?;
            platform_group.add_data(&mut self.writer, items)?;
        }

        platform_group.write_metadata(&mut self.writer)?;

        if let Some(usage) = &self.usage {
            info!("Collecting from {}...", usage.name());
            let items = usage.collect().await.map_err(CollectError::Usage)?;
            usage_group.add_data(&mut self.writer, items)?;
            usage_group.write_metadata(&mut self.writer)?;
        }

        Ok(())
    }
}

/// One archive group being filled during a run.
struct Group {
    name: &'static str,
    metadata: Metadata,
    /// Member names taken so far, including the manifest.
    written: BTreeSet<String>,
}

impl Group {
    fn new(name: &'static str, metadata: Metadata) -> Self {
        Self {
            name,
            metadata,
            written: BTreeSet::from([MANIFEST_FILE_NAME.to_string()]),
        }
    }

    fn add_data<W: ArchiveWriter>(
        &mut self,
        writer: &mut W,
        items: Vec<CollectedItem>,
    ) -> Result<(), CollectError> {
        for mut item in items {
            if !is_valid_member_name(&item.name) {
                return Err(CollectError::InvalidItemName {
                    group: self.name,
                    name: item.name,
                });
            }
            if self.written.contains(&item.name) {
                return Err(CollectError::DuplicateItem {
                    group: self.name,
                    name: item.name,
                });
            }

            let mut content = Vec::new();
            item.content
                .read_to_end(&mut content)
                .map_err(|source| CollectError::ContentRead {
                    name: item.name.clone(),
                    source,
                })?;

            let member = member_name(self.name, &item.name);
            writer
                .add_file(&content, &member)
                .map_err(|source| CollectError::DataWrite {
                    name: member.clone(),
                    source,
                })?;
            debug!("Wrote {} ({} bytes)", member, content.len());

            self.written.insert(item.name.clone());
            self.metadata.file_digests.push(FileDigest {
                name: item.name,
                mime_type: item.mime_type,
                product_type: item.product_type,
                data_type: item.data_type,
                md5_checksum: hash::md5_base64(&content),
            });
        }
        Ok(())
    }

    fn write_metadata<W: ArchiveWriter>(&self, writer: &mut W) -> Result<(), CollectError> {
        let contents = serde_json::to_vec(&self.metadata).map_err(|source| {
            CollectError::MetadataEncode {
                group: self.name,
                source,
            }
        })?;
        let member = member_name(self.name, MANIFEST_FILE_NAME);
        writer
            .add_file(&contents, &member)
            .map_err(|source| CollectError::DataWrite {
                name: member.clone(),
                source,
            })?;
        info!(
            "Wrote {} with {} file digests",
            member,
            self.metadata.file_digests.len()
        );
        Ok(())
    }
}
