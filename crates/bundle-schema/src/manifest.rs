//! Manifest types for the collection archive.
//!
//! An archive is split into groups. Every member lives at `<group>/<name>`
//! and each group carries exactly one manifest member at
//! `<group>/metadata` describing the other members of that group.

use serde::{Deserialize, Serialize};

/// Group holding platform manager (and secrets manager) data.
pub const PLATFORM_MANAGER_GROUP: &str = "platform-manager-group";
/// Group holding usage service data.
pub const USAGE_GROUP: &str = "usage-group";
/// Name of the manifest member inside each group.
pub const MANIFEST_FILE_NAME: &str = "metadata";

/// Build the archive member name of `name` inside `group`.
pub fn member_name(group: &str, name: &str) -> String {
    format!("{}/{}", group, name)
}

/// The manifest of one group.
///
/// Unknown fields are rejected on read so that format drift between the
/// collector and the sender surfaces as an error instead of silent loss.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct Metadata {
    pub collector_version: String,
    pub env_type: String,
    pub collected_at: String,
    pub collection_id: String,
    pub file_digests: Vec<FileDigest>,
}

impl Metadata {
    pub fn new(
        collector_version: impl Into<String>,
        env_type: impl Into<String>,
        collected_at: impl Into<String>,
        collection_id: impl Into<String>,
    ) -> Self {
        Self {
            collector_version: collector_version.into(),
            env_type: env_type.into(),
            collected_at: collected_at.into(),
            collection_id: collection_id.into(),
            file_digests: Vec::new(),
        }
    }

    /// Parse a manifest, rejecting unknown top-level fields.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Integrity record for one archived member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileDigest {
    pub name: String,
    pub mime_type: String,
    pub product_type: String,
    pub data_type: String,
    /// Base64 encoded MD5 of the member content.
    pub md5_checksum: String,
}
